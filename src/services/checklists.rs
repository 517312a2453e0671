//! Checklist record service
//!
//! CRUD over `checklists/{id}`, implicitly scoped to the currently
//! authenticated user. Item mutations are whole-document
//! read-modify-write: the full `items` array is replaced on every
//! change, so two concurrent editors of the same checklist can lose an
//! update (last write wins on the whole array).

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DataStoreError, Error};
use crate::identity::IdentityClient;
use crate::models::{Checklist, ChecklistItem};
use crate::store::{DocumentStore, SortOrder};

const COLLECTION: &str = "checklists";

/// Input for creating a checklist. `createdBy` is resolved from the
/// active session, never supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewChecklist {
    pub title: String,
    pub description: Option<String>,
    pub is_public: bool,
}

/// A partial checklist update. `id`, `createdAt` and `createdBy` are not
/// representable here, so they cannot be mutated.
#[derive(Debug, Clone, Default)]
pub struct ChecklistPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

/// Input for a new checklist item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
}

/// A partial item update.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

/// CRUD wrapper for checklist documents and their embedded item arrays.
pub struct ChecklistService {
    store: DocumentStore,
    identity: Arc<IdentityClient>,
}

impl ChecklistService {
    pub fn new(store: DocumentStore, identity: Arc<IdentityClient>) -> Self {
        Self { store, identity }
    }

    /// The active session's id, or an authentication error.
    fn current_uid(&self, operation: &'static str) -> Result<String, Error> {
        self.identity
            .current_uid()
            .ok_or_else(|| DataStoreError::unauthenticated(operation).into())
    }

    /// Store handle carrying the caller's bearer token when a session
    /// is active.
    fn scoped_store(&self) -> DocumentStore {
        match self.identity.get_session() {
            Some(session) => self.store.clone().with_auth(&session.id_token),
            None => self.store.clone(),
        }
    }

    /// Create a checklist owned by the current user.
    pub async fn create_checklist(&self, input: NewChecklist) -> Result<Checklist, Error> {
        let uid = self.current_uid("createChecklist")?;
        let now = Utc::now();
        let mut checklist = Checklist {
            id: String::new(),
            title: input.title,
            description: input.description,
            is_public: input.is_public,
            created_by: uid,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        };

        // The store generates the id; leave it out of the payload.
        let mut body = serde_json::to_value(&checklist)?;
        if let Some(map) = body.as_object_mut() {
            map.remove("id");
        }

        let id = self
            .scoped_store()
            .collection(COLLECTION)
            .add(&body)
            .await
            .map_err(map_store_err("createChecklist"))?;

        checklist.id = id;
        Ok(checklist)
    }

    /// Fetch a checklist. Absent documents are `Ok(None)`.
    pub async fn get_checklist(&self, id: &str) -> Result<Option<Checklist>, Error> {
        self.current_uid("getChecklist")?;
        self.scoped_store()
            .collection(COLLECTION)
            .doc(id)
            .get::<Checklist>()
            .await
            .map_err(map_store_err("getChecklist"))
    }

    /// Merge defined fields into a checklist, refreshing `updatedAt`.
    pub async fn update_checklist(&self, id: &str, patch: ChecklistPatch) -> Result<(), Error> {
        self.current_uid("updateChecklist")?;

        let mut fields = serde_json::Map::new();
        if let Some(title) = patch.title {
            fields.insert("title".into(), Value::String(title));
        }
        if let Some(description) = patch.description {
            fields.insert("description".into(), Value::String(description));
        }
        if let Some(is_public) = patch.is_public {
            fields.insert("isPublic".into(), Value::Bool(is_public));
        }
        fields.insert("updatedAt".into(), serde_json::to_value(Utc::now())?);

        self.scoped_store()
            .collection(COLLECTION)
            .doc(id)
            .update(&Value::Object(fields))
            .await
            .map_err(map_store_err("updateChecklist"))
    }

    /// Remove a checklist document.
    pub async fn delete_checklist(&self, id: &str) -> Result<(), Error> {
        self.current_uid("deleteChecklist")?;
        self.scoped_store()
            .collection(COLLECTION)
            .doc(id)
            .delete()
            .await
            .map_err(map_store_err("deleteChecklist"))
    }

    /// Append an item to a checklist. The item id is client-generated.
    pub async fn add_checklist_item(
        &self,
        checklist_id: &str,
        input: NewItem,
    ) -> Result<ChecklistItem, Error> {
        let operation = "addChecklistItem";
        let checklist = self.read_for_items(checklist_id, operation).await?;

        let item = ChecklistItem {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            completed: false,
            created_at: Utc::now(),
            updated_at: None,
        };
        let items = push_item(checklist.items, item.clone());

        self.write_items(checklist_id, items, operation).await?;
        Ok(item)
    }

    /// Update one item by id. An id with no matching item leaves the
    /// array unchanged.
    pub async fn update_checklist_item(
        &self,
        checklist_id: &str,
        item_id: &str,
        patch: ItemPatch,
    ) -> Result<(), Error> {
        let operation = "updateChecklistItem";
        let checklist = self.read_for_items(checklist_id, operation).await?;
        let items = patch_item(checklist.items, item_id, &patch);
        self.write_items(checklist_id, items, operation).await
    }

    /// Remove one item by id.
    pub async fn remove_checklist_item(
        &self,
        checklist_id: &str,
        item_id: &str,
    ) -> Result<(), Error> {
        let operation = "removeChecklistItem";
        let checklist = self.read_for_items(checklist_id, operation).await?;
        let items = remove_item(checklist.items, item_id);
        self.write_items(checklist_id, items, operation).await
    }

    /// All of the caller's checklists, most recently updated first.
    pub async fn get_all_checklists(&self) -> Result<Vec<Checklist>, Error> {
        let uid = self.current_uid("getAllChecklists")?;
        self.scoped_store()
            .collection(COLLECTION)
            .query()
            .filter_eq("createdBy", &uid)
            .order_by("updatedAt", SortOrder::Descending)
            .execute::<Checklist>()
            .await
            .map_err(map_store_err("getAllChecklists"))
    }

    async fn read_for_items(
        &self,
        checklist_id: &str,
        operation: &'static str,
    ) -> Result<Checklist, Error> {
        self.current_uid(operation)?;
        self.scoped_store()
            .collection(COLLECTION)
            .doc(checklist_id)
            .get::<Checklist>()
            .await
            .map_err(map_store_err(operation))?
            .ok_or_else(|| DataStoreError::failed(operation).into())
    }

    /// Replace the entire items array. This is the unguarded
    /// read-modify-write: a concurrent writer's items are overwritten.
    async fn write_items(
        &self,
        checklist_id: &str,
        items: Vec<ChecklistItem>,
        operation: &'static str,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({
            "items": items,
            "updatedAt": Utc::now(),
        });
        self.scoped_store()
            .collection(COLLECTION)
            .doc(checklist_id)
            .update(&patch)
            .await
            .map_err(map_store_err(operation))
    }
}

/// Append an item to the array.
fn push_item(mut items: Vec<ChecklistItem>, item: ChecklistItem) -> Vec<ChecklistItem> {
    items.push(item);
    items
}

/// Map the matching item through the patch, stamping `updatedAt`.
fn patch_item(items: Vec<ChecklistItem>, item_id: &str, patch: &ItemPatch) -> Vec<ChecklistItem> {
    items
        .into_iter()
        .map(|mut item| {
            if item.id == item_id {
                if let Some(title) = &patch.title {
                    item.title = title.clone();
                }
                if let Some(completed) = patch.completed {
                    item.completed = completed;
                }
                item.updated_at = Some(Utc::now());
            }
            item
        })
        .collect()
}

/// Drop the matching item.
fn remove_item(items: Vec<ChecklistItem>, item_id: &str) -> Vec<ChecklistItem> {
    items.into_iter().filter(|item| item.id != item_id).collect()
}

/// Map raw store failures onto the checklist service's error surface.
/// Unlike the user service, authentication and permission failures stay
/// distinguishable here.
fn map_store_err(operation: &'static str) -> impl FnOnce(Error) -> Error {
    move |err| match err {
        Error::Store { status: 401, .. } => DataStoreError::unauthenticated(operation).into(),
        Error::Store { status: 403, .. } => DataStoreError::permission_denied(operation).into(),
        other => {
            log::warn!("{}: {}", operation, other);
            DataStoreError::failed(operation).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, title: &str, completed: bool) -> ChecklistItem {
        ChecklistItem {
            id: id.into(),
            title: title.into(),
            completed,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn push_appends_at_the_end() {
        let items = push_item(vec![item("a", "Milk", false)], item("b", "Eggs", false));
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, "b");
    }

    #[test]
    fn patch_touches_only_the_matching_item() {
        let items = vec![item("a", "Milk", false), item("b", "Eggs", false)];
        let patched = patch_item(
            items,
            "b",
            &ItemPatch {
                completed: Some(true),
                ..Default::default()
            },
        );
        assert!(!patched[0].completed);
        assert!(patched[0].updated_at.is_none());
        assert!(patched[1].completed);
        assert!(patched[1].updated_at.is_some());
        assert_eq!(patched[1].title, "Eggs");
    }

    #[test]
    fn patch_with_unknown_id_changes_nothing() {
        let items = vec![item("a", "Milk", false)];
        let patched = patch_item(
            items.clone(),
            "missing",
            &ItemPatch {
                title: Some("Bread".into()),
                ..Default::default()
            },
        );
        assert_eq!(patched, items);
    }

    #[test]
    fn remove_filters_by_id() {
        let items = vec![item("a", "Milk", false), item("b", "Eggs", false)];
        let remaining = remove_item(items, "a");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");
    }

    // Two writers patch different items starting from the same stale
    // read. Whichever array is written last wins; the other writer's
    // change is silently dropped. This pins the current behavior, it is
    // not an endorsement of it.
    #[test]
    fn stale_read_modify_write_loses_first_writers_change() {
        let base = vec![item("a", "Milk", false), item("b", "Eggs", false)];

        let writer_one = patch_item(
            base.clone(),
            "a",
            &ItemPatch {
                completed: Some(true),
                ..Default::default()
            },
        );
        let writer_two = patch_item(
            base.clone(),
            "b",
            &ItemPatch {
                completed: Some(true),
                ..Default::default()
            },
        );

        // Both writes replace the whole array; simulate writer one
        // landing first, then writer two overwriting it.
        let stored_after_one = writer_one;
        assert!(stored_after_one[0].completed);

        let stored_after_two = writer_two;
        assert!(!stored_after_two[0].completed, "writer one's change is gone");
        assert!(stored_after_two[1].completed);
    }
}
