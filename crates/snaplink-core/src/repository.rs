use crate::cursor::Keyed;
use crate::error::Result;
use crate::keyset::KeysetQuery;
use crate::record::{
    LinkFilter, LinkRecord, NewLink, NewRole, NewUser, RecordId, Redirection, RoleFilter,
    RolePatch, RoleRecord, UserFilter, UserPatch, UserRecord,
};
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use jiff::Timestamp;

/// A collection that supports ordered keyset scans.
#[async_trait]
pub trait KeysetSource<F: Send + Sync>: Send + Sync + 'static {
    type Item: Keyed + Send;

    /// Returns at most `query.fetch()` items that match the query's filter
    /// and that [`KeysetQuery::admits`], ordered newest first.
    async fn scan(&self, query: &KeysetQuery<F>) -> Result<Vec<Self::Item>>;
}

#[async_trait]
pub trait LinkRepository: KeysetSource<LinkFilter, Item = LinkRecord> {
    /// Inserts a new link in a single atomic step.
    ///
    /// Returns `Err(StorageError::Conflict)` if the short code is already
    /// taken, including by a deactivated link. No other check precedes the
    /// insert.
    async fn insert(&self, link: NewLink) -> Result<LinkRecord>;

    /// Retrieves a link by short code regardless of its state.
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>>;

    /// Atomically increments the click counter of an active, unexpired link
    /// and returns its target.
    ///
    /// Returns `None`, leaving every counter untouched, if the link is
    /// missing, inactive, or expired at `now`.
    async fn redeem(&self, code: &ShortCode, now: Timestamp) -> Result<Option<Redirection>>;

    /// Marks a link inactive. Returns `true` if an active link was changed.
    async fn deactivate(&self, code: &ShortCode) -> Result<bool>;
}

#[async_trait]
pub trait UserRepository: KeysetSource<UserFilter, Item = UserRecord> {
    /// Inserts a user.
    ///
    /// Returns `Err(StorageError::Conflict)` if another non-deleted user
    /// already has the same email, and `Err(StorageError::MissingReference)`
    /// if the role is missing or deleted. Both checks happen in the same
    /// atomic step as the insert.
    async fn insert(&self, user: NewUser) -> Result<UserRecord>;

    async fn get(&self, id: RecordId, include_deleted: bool) -> Result<Option<UserRecord>>;

    async fn find_by_email(&self, email: &str, include_deleted: bool)
        -> Result<Option<UserRecord>>;

    /// Applies `patch` to a non-deleted user and returns the updated record,
    /// or `None` if no such user exists.
    ///
    /// Fails like [`UserRepository::insert`] when the new email is taken or
    /// the new role is missing or deleted. `updated_by` is recorded when
    /// given.
    async fn update(
        &self,
        id: RecordId,
        patch: UserPatch,
        updated_by: Option<String>,
    ) -> Result<Option<UserRecord>>;

    /// Soft-deletes a user, which also deactivates it and frees its email.
    /// Returns `true` if a non-deleted user was changed.
    async fn soft_delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<bool>;
}

#[async_trait]
pub trait RoleRepository: KeysetSource<RoleFilter, Item = RoleRecord> {
    async fn insert(&self, role: NewRole) -> Result<RoleRecord>;

    async fn get(&self, id: RecordId, include_deleted: bool) -> Result<Option<RoleRecord>>;

    /// Applies `patch` to a non-deleted role, returning `None` if there is
    /// no such role.
    async fn update(
        &self,
        id: RecordId,
        patch: RolePatch,
        updated_by: Option<String>,
    ) -> Result<Option<RoleRecord>>;

    /// Soft-deletes a role. Returns `true` if a non-deleted role was changed.
    async fn soft_delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<bool>;
}
