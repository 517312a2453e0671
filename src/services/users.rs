//! User record service
//!
//! CRUD over `users/{id}`. Transport detail is deliberately discarded at
//! this boundary: every underlying failure is re-raised as a generic
//! "operation failed" error for the operation in question.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::error::{DataStoreError, Error};
use crate::models::{User, UserMetadata, UserRole};
use crate::store::DocumentStore;

const COLLECTION: &str = "users";

/// Input for creating a user record. Timestamps are never accepted from
/// the caller; they are stamped at write time.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub email_verified: bool,
    pub is_anonymous: bool,
    pub role: UserRole,
    pub password: Option<String>,
}

/// A partial update. Only defined fields are merged into the stored
/// document; `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: Option<bool>,
    pub is_anonymous: Option<bool>,
    pub role: Option<UserRole>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserPatch {
    /// Render the defined fields as a merge patch. Returns an empty map
    /// when nothing is set.
    fn to_value(&self) -> Result<Map<String, Value>, Error> {
        let mut fields = Map::new();
        if let Some(email) = &self.email {
            fields.insert("email".into(), Value::String(email.clone()));
        }
        if let Some(display_name) = &self.display_name {
            fields.insert("displayName".into(), Value::String(display_name.clone()));
        }
        if let Some(photo_url) = &self.photo_url {
            fields.insert("photoURL".into(), Value::String(photo_url.clone()));
        }
        if let Some(email_verified) = self.email_verified {
            fields.insert("emailVerified".into(), Value::Bool(email_verified));
        }
        if let Some(is_anonymous) = self.is_anonymous {
            fields.insert("isAnonymous".into(), Value::Bool(is_anonymous));
        }
        if let Some(role) = self.role {
            fields.insert("role".into(), serde_json::to_value(role)?);
        }
        if let Some(last_login) = self.last_login {
            fields.insert(
                "metadata".into(),
                serde_json::json!({ "lastLogin": last_login }),
            );
        }
        Ok(fields)
    }
}

/// CRUD wrapper mapping application `User` records to `users/{id}`.
#[derive(Clone)]
pub struct UserService {
    store: DocumentStore,
}

impl UserService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Write a full user record. `createdAt`/`updatedAt` are stamped
    /// here, overwriting any caller-supplied values.
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, Error> {
        let now = Utc::now();
        let user = User {
            id: input.id.clone(),
            email: input.email,
            display_name: input.display_name,
            photo_url: input.photo_url,
            email_verified: input.email_verified,
            is_active: true,
            is_anonymous: input.is_anonymous,
            role: input.role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            metadata: UserMetadata::new(now),
            password: input.password,
        };

        self.store
            .collection(COLLECTION)
            .doc(&input.id)
            .set(&user)
            .await
            .map_err(generic("createUser"))?;

        Ok(user)
    }

    /// Fetch a record. Absent documents are `Ok(None)`; only transport
    /// failures error.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, Error> {
        self.store
            .collection(COLLECTION)
            .doc(id)
            .get::<User>()
            .await
            .map_err(generic("getUser"))
    }

    /// Merge defined fields into the stored record, refreshing
    /// `updatedAt`. A patch with no defined fields is a no-op: no network
    /// write happens for a timestamp-only change.
    pub async fn update_user(&self, id: &str, patch: UserPatch) -> Result<(), Error> {
        let mut fields = patch.to_value()?;
        if fields.is_empty() {
            debug!("updateUser({}): empty patch, skipping write", id);
            return Ok(());
        }
        fields.insert("updatedAt".into(), serde_json::to_value(Utc::now())?);

        self.store
            .collection(COLLECTION)
            .doc(id)
            .update(&Value::Object(fields))
            .await
            .map_err(generic("updateUser"))
    }

    /// Soft-delete: mark the record inactive and stamp `deletedAt`.
    pub async fn deactivate_user(&self, id: &str) -> Result<(), Error> {
        self.deactivate_user_raw(id)
            .await
            .map_err(generic("deactivateUser"))
    }

    /// Deactivate then permanently remove the record. A document that is
    /// already gone is logged and ignored, making the call idempotent.
    pub async fn delete_user(&self, id: &str) -> Result<(), Error> {
        match self.deactivate_user_raw(id).await {
            Ok(()) => {}
            Err(Error::Store { status: 404, .. }) => {
                warn!("deleteUser({}): record not found, nothing to delete", id);
                return Ok(());
            }
            Err(err) => return Err(generic("deleteUser")(err)),
        }

        match self.store.collection(COLLECTION).doc(id).delete().await {
            Ok(()) => Ok(()),
            Err(Error::Store { status: 404, .. }) => {
                warn!("deleteUser({}): record already removed", id);
                Ok(())
            }
            Err(err) => Err(generic("deleteUser")(err)),
        }
    }

    /// Deactivation patch, keeping the raw store error so `delete_user`
    /// can recognize an absent document.
    async fn deactivate_user_raw(&self, id: &str) -> Result<(), Error> {
        let now = Utc::now();
        let patch = serde_json::json!({
            "isActive": false,
            "deletedAt": now,
            "updatedAt": now,
        });
        self.store.collection(COLLECTION).doc(id).update(&patch).await
    }
}

fn generic(operation: &'static str) -> impl FnOnce(Error) -> Error {
    move |err| {
        warn!("{}: {}", operation, err);
        DataStoreError::failed(operation).into()
    }
}
