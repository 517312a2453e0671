//! Record services over the document store

pub mod checklists;
pub mod users;

pub use checklists::{ChecklistPatch, ChecklistService, ItemPatch, NewChecklist, NewItem};
pub use users::{CreateUserInput, UserPatch, UserService};
