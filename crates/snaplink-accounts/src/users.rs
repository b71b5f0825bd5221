use std::sync::Arc;

use jiff::Timestamp;
use snaplink_core::{
    list_page, NewUser, Page, PageLimits, RecordId, StorageError, UserFilter,
    UserPatch, UserRecord, UserRepository,
};
use tracing::info;
use typed_builder::TypedBuilder;

use crate::error::{AccountError, Result};
use crate::validation::{self, MAX_FULLNAME_CHARS};

/// Input for [`UserService::create`].
///
/// `password_hash` must already be hashed; this crate never sees plaintext.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateUser {
    #[builder(setter(into))]
    pub fullname: String,
    pub role_id: RecordId,
    #[builder(setter(into))]
    pub email: String,
    #[builder(setter(into))]
    pub password_hash: String,
    #[builder(default, setter(strip_option, into))]
    pub created_by: Option<String>,
}

/// Input for [`UserService::update`]. Unset fields are left as they are.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option, into)))]
pub struct UpdateUser {
    pub fullname: Option<String>,
    pub role_id: Option<RecordId>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub updated_by: Option<String>,
}

fn write_error(err: StorageError) -> AccountError {
    match err {
        StorageError::Conflict(email) => AccountError::EmailConflict(email),
        StorageError::MissingReference(what) => {
            AccountError::Validation(format!("unknown {what}"))
        }
        other => other.into(),
    }
}

fn password_hash(hash: String) -> Result<String> {
    if hash.is_empty() {
        return Err(AccountError::Validation("password hash is required".to_string()));
    }
    Ok(hash)
}

/// User administration. The store also vouches for each user's role.
#[derive(Debug)]
pub struct UserService<R> {
    repository: Arc<R>,
    page_limits: PageLimits,
}

impl<R> Clone for UserService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            page_limits: self.page_limits,
        }
    }
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repository: R, page_limits: PageLimits) -> Self {
        Self::from_shared(Arc::new(repository), page_limits)
    }

    pub fn from_shared(repository: Arc<R>, page_limits: PageLimits) -> Self {
        Self {
            repository,
            page_limits,
        }
    }

    pub async fn create(&self, user: CreateUser) -> Result<UserRecord> {
        self.create_at(user, Timestamp::now()).await
    }

    /// Creates a user stamped as created at `now`.
    ///
    /// The store checks, in the same step as the insert, that the role is
    /// live and that no live user has the email. A clash is reported as
    /// [`AccountError::EmailConflict`], a missing role as a validation error.
    pub async fn create_at(&self, user: CreateUser, now: Timestamp) -> Result<UserRecord> {
        let new_user = NewUser {
            fullname: validation::required_text("fullname", &user.fullname, MAX_FULLNAME_CHARS)?,
            role_id: user.role_id,
            email: validation::email(&user.email)?,
            password_hash: password_hash(user.password_hash)?,
            created_by: user.created_by,
            created_at: now,
        };

        let created = UserRepository::insert(self.repository.as_ref(), new_user)
            .await
            .map_err(write_error)?;
        info!(id = %created.id, role_id = %created.role_id, "user created");
        Ok(created)
    }

    /// Changes a live user.
    ///
    /// Given fields are validated and normalized as on creation. Deleted
    /// users are [`AccountError::NotFound`].
    pub async fn update(&self, id: RecordId, changes: UpdateUser) -> Result<UserRecord> {
        let patch = UserPatch {
            fullname: changes
                .fullname
                .as_deref()
                .map(|name| validation::required_text("fullname", name, MAX_FULLNAME_CHARS))
                .transpose()?,
            role_id: changes.role_id,
            email: changes.email.as_deref().map(validation::email).transpose()?,
            password_hash: changes.password_hash.map(password_hash).transpose()?,
            is_active: changes.is_active,
        };
        if patch.is_empty() {
            return Err(AccountError::Validation("nothing to update".to_string()));
        }

        let repository = self.repository.as_ref();
        let updated = UserRepository::update(repository, id, patch, changes.updated_by)
            .await
            .map_err(write_error)?
            .ok_or_else(|| AccountError::NotFound(format!("user {id}")))?;
        info!(id = %id, "user updated");
        Ok(updated)
    }

    pub async fn get(&self, id: RecordId, include_deleted: bool) -> Result<UserRecord> {
        UserRepository::get(self.repository.as_ref(), id, include_deleted)
            .await?
            .ok_or_else(|| AccountError::NotFound(format!("user {id}")))
    }

    /// Looks a user up by email, in any letter case.
    pub async fn get_by_email(&self, email: &str, include_deleted: bool) -> Result<UserRecord> {
        let email = validation::email(email)?;
        self.repository
            .find_by_email(&email, include_deleted)
            .await?
            .ok_or_else(|| AccountError::NotFound(format!("user {email}")))
    }

    pub async fn list(
        &self,
        filter: UserFilter,
        cursor: Option<&str>,
        requested_limit: Option<i64>,
    ) -> Result<Page<UserRecord>> {
        let limit = self.page_limits.clamp(requested_limit);
        Ok(list_page::<R, UserFilter>(self.repository.as_ref(), filter, cursor, limit).await?)
    }

    /// Soft-deletes a user, freeing its email for reuse.
    pub async fn delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<()> {
        if !UserRepository::soft_delete(self.repository.as_ref(), id, deleted_by).await? {
            return Err(AccountError::NotFound(format!("user {id}")));
        }
        info!(id = %id, "user deleted");
        Ok(())
    }
}
