use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use jiff::Timestamp;
use snaplink_core::error::{Result, StorageError};
use snaplink_core::cursor::Keyed;
use snaplink_core::keyset::{order_newest_first, KeysetQuery};
use snaplink_core::{
    KeysetSource, LinkFilter, LinkRecord, LinkRepository, NewLink, NewRole, NewUser, RecordId,
    Redirection, RoleFilter, RolePatch, RoleRecord, RoleRepository, ShortCode, UserFilter,
    UserPatch, UserRecord, UserRepository,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct Collections {
    next_id: AtomicU64,
    links: DashMap<String, LinkRecord>,
    users: DashMap<RecordId, UserRecord>,
    /// Email of every non-deleted user, acting as the unique index.
    live_emails: DashMap<String, RecordId>,
    roles: DashMap<RecordId, RoleRecord>,
}

/// In-memory implementation of every repository contract.
///
/// DashMap's sharded locks stand in for the store primitives the contracts
/// need: the `entry` API is the insert-time uniqueness constraint and
/// `get_mut` holds the shard write lock across the check-and-increment of
/// a redemption. User writes hold a read guard on the referenced role, so a
/// concurrent role delete waits for them. Locks are taken in the order
/// roles, users, live emails. Listing scans all shards, which is fine for tests and
/// single-node demos but linear in the collection size.
///
/// Cloning yields another handle to the same collections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> RecordId {
        RecordId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Read guard on a non-deleted role, blocking its deletion while held.
    fn live_role(&self, id: RecordId) -> Result<Ref<'_, RecordId, RoleRecord>> {
        self.inner
            .roles
            .get(&id)
            .filter(|role| !role.is_deleted)
            .ok_or_else(|| StorageError::MissingReference(format!("role {id}")))
    }
}

fn scan_map<K, V, F>(
    map: &DashMap<K, V>,
    query: &KeysetQuery<F>,
    matches: impl Fn(&F, &V) -> bool,
) -> Vec<V>
where
    K: Eq + std::hash::Hash,
    V: Clone + Keyed,
{
    let mut rows: Vec<V> = map
        .iter()
        .filter(|entry| matches(query.filter(), entry.value()))
        .filter(|entry| query.admits(&entry.value().position()))
        .map(|entry| entry.value().clone())
        .collect();
    order_newest_first(&mut rows);
    rows.truncate(query.fetch());
    rows
}

#[async_trait]
impl KeysetSource<LinkFilter> for InMemoryStore {
    type Item = LinkRecord;

    async fn scan(&self, query: &KeysetQuery<LinkFilter>) -> Result<Vec<LinkRecord>> {
        Ok(scan_map(&self.inner.links, query, LinkFilter::matches))
    }
}

#[async_trait]
impl LinkRepository for InMemoryStore {
    async fn insert(&self, link: NewLink) -> Result<LinkRecord> {
        match self.inner.links.entry(link.code.as_str().to_owned()) {
            Entry::Occupied(occupied) => Err(StorageError::Conflict(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                let record = link.into_record(self.next_id());
                vacant.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>> {
        Ok(self
            .inner
            .links
            .get(code.as_str())
            .map(|entry| entry.value().clone()))
    }

    async fn redeem(&self, code: &ShortCode, now: Timestamp) -> Result<Option<Redirection>> {
        let Some(mut entry) = self.inner.links.get_mut(code.as_str()) else {
            return Ok(None);
        };

        if !entry.is_redeemable_at(now) {
            trace!(code = %code, "link is inactive or expired");
            return Ok(None);
        }

        entry.clicks = entry.clicks.saturating_add(1);
        Ok(Some(Redirection {
            original_url: entry.original_url.clone(),
            redirect_type: entry.redirect_type,
        }))
    }

    async fn deactivate(&self, code: &ShortCode) -> Result<bool> {
        let Some(mut entry) = self.inner.links.get_mut(code.as_str()) else {
            return Ok(false);
        };
        let was_active = entry.is_active;
        entry.is_active = false;
        Ok(was_active)
    }
}

#[async_trait]
impl KeysetSource<UserFilter> for InMemoryStore {
    type Item = UserRecord;

    async fn scan(&self, query: &KeysetQuery<UserFilter>) -> Result<Vec<UserRecord>> {
        Ok(scan_map(&self.inner.users, query, UserFilter::matches))
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let _role = self.live_role(user.role_id)?;
        let id = self.next_id();

        // The index slot is claimed and released before touching `users`,
        // so the two maps are never locked at the same time.
        match self.inner.live_emails.entry(user.email.clone()) {
            Entry::Occupied(occupied) => {
                return Err(StorageError::Conflict(occupied.key().clone()));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let record = user.into_record(id);
        self.inner.users.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: RecordId, include_deleted: bool) -> Result<Option<UserRecord>> {
        Ok(self
            .inner
            .users
            .get(&id)
            .filter(|user| include_deleted || !user.is_deleted)
            .map(|user| user.value().clone()))
    }

    async fn find_by_email(
        &self,
        email: &str,
        include_deleted: bool,
    ) -> Result<Option<UserRecord>> {
        let live = self
            .inner
            .live_emails
            .get(email)
            .map(|entry| *entry.value());
        if let Some(id) = live {
            if let Some(user) = UserRepository::get(self, id, false).await? {
                return Ok(Some(user));
            }
        }

        if !include_deleted {
            return Ok(None);
        }

        // Several deleted accounts may share an address; return the newest.
        Ok(self
            .inner
            .users
            .iter()
            .filter(|entry| entry.email == email)
            .map(|entry| entry.value().clone())
            .max_by_key(|user| (user.created_at, user.id)))
    }

    async fn update(
        &self,
        id: RecordId,
        patch: UserPatch,
        updated_by: Option<String>,
    ) -> Result<Option<UserRecord>> {
        let _role = patch.role_id.map(|role_id| self.live_role(role_id)).transpose()?;

        let Some(mut user) = self.inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if user.is_deleted {
            return Ok(None);
        }

        if let Some(email) = patch.email.as_ref().filter(|email| **email != user.email) {
            match self.inner.live_emails.entry(email.clone()) {
                Entry::Occupied(occupied) => {
                    return Err(StorageError::Conflict(occupied.key().clone()));
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(id);
                }
            }
            self.inner
                .live_emails
                .remove_if(&user.email, |_, owner| *owner == id);
        }

        patch.apply(&mut user);
        if updated_by.is_some() {
            user.updated_by = updated_by;
        }
        Ok(Some(user.clone()))
    }

    async fn soft_delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<bool> {
        let email = {
            let Some(mut user) = self.inner.users.get_mut(&id) else {
                return Ok(false);
            };
            if user.is_deleted {
                return Ok(false);
            }
            user.is_deleted = true;
            user.is_active = false;
            user.updated_by = deleted_by;
            user.email.clone()
        };

        self.inner
            .live_emails
            .remove_if(&email, |_, owner| *owner == id);
        Ok(true)
    }
}

#[async_trait]
impl KeysetSource<RoleFilter> for InMemoryStore {
    type Item = RoleRecord;

    async fn scan(&self, query: &KeysetQuery<RoleFilter>) -> Result<Vec<RoleRecord>> {
        Ok(scan_map(&self.inner.roles, query, RoleFilter::matches))
    }
}

#[async_trait]
impl RoleRepository for InMemoryStore {
    async fn insert(&self, role: NewRole) -> Result<RoleRecord> {
        let record = role.into_record(self.next_id());
        self.inner.roles.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: RecordId, include_deleted: bool) -> Result<Option<RoleRecord>> {
        Ok(self
            .inner
            .roles
            .get(&id)
            .filter(|role| include_deleted || !role.is_deleted)
            .map(|role| role.value().clone()))
    }

    async fn update(
        &self,
        id: RecordId,
        patch: RolePatch,
        updated_by: Option<String>,
    ) -> Result<Option<RoleRecord>> {
        let Some(mut role) = self.inner.roles.get_mut(&id) else {
            return Ok(None);
        };
        if role.is_deleted {
            return Ok(None);
        }

        patch.apply(&mut role);
        if updated_by.is_some() {
            role.updated_by = updated_by;
        }
        Ok(Some(role.clone()))
    }

    async fn soft_delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<bool> {
        let Some(mut role) = self.inner.roles.get_mut(&id) else {
            return Ok(false);
        };
        if role.is_deleted {
            return Ok(false);
        }
        role.is_deleted = true;
        role.is_active = false;
        role.updated_by = deleted_by;
        Ok(true)
    }
}
