use async_trait::async_trait;
use jiff::Timestamp;
use snaplink_core::error::{Result, StorageError};
use snaplink_core::keyset::KeysetQuery;
use snaplink_core::{
    KeysetSource, LinkFilter, LinkRecord, LinkRepository, NewLink, NewRole, NewUser, RecordId,
    Redirection, RedirectType, RoleFilter, RolePatch, RoleRecord, RoleRepository, ShortCode,
    UserFilter, UserPatch, UserRecord, UserRepository,
};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tracing::{debug, trace};

const LINK_COLUMNS: &str =
    "id, short_code, original_url, clicks, is_active, expire_at, redirect_type, created_at";
const USER_COLUMNS: &str = "id, fullname, role_id, email, password_hash, is_active, is_deleted, \
     created_by, updated_by, created_at";
const ROLE_COLUMNS: &str =
    "id, name, description, is_active, is_deleted, created_by, updated_by, created_at";

/// MySQL implementation of the repository contracts.
///
/// Keyset scans rely on the `(created_at, id)` index of each table. Short
/// code and live-email uniqueness are unique indexes, so an insert is the
/// only arbiter of a conflict. A user's role is checked by the same
/// statement that writes the user, under a shared lock on the role row.
/// Soft-deleted or deactivated rows are kept,
/// which means a short code is never reused.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Operation(format!("migration failed: {e}")))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn to_micros(ts: Timestamp) -> i64 {
    ts.as_microsecond()
}

fn from_micros(value: i64) -> Result<Timestamp> {
    Timestamp::from_microsecond(value).map_err(|e| {
        StorageError::InvalidData(format!("invalid timestamp '{}': {e}", value))
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

/// Appends the resume predicate, ordering and fetch bound of `query`.
///
/// Must come last, after every filter clause.
fn push_keyset<F>(builder: &mut QueryBuilder<'_, MySql>, query: &KeysetQuery<F>) {
    if let Some(after) = query.after() {
        let created_at = to_micros(after.created_at);
        builder
            .push(" AND (created_at < ")
            .push_bind(created_at)
            .push(" OR (created_at = ")
            .push_bind(created_at)
            .push(" AND id < ")
            .push_bind(after.id.get())
            .push("))");
    }

    builder
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(query.fetch() as u64);
}

fn select_from(columns: &str, table: &str) -> QueryBuilder<'static, MySql> {
    QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE 1 = 1"))
}

fn link_scan_sql(query: &KeysetQuery<LinkFilter>) -> QueryBuilder<'static, MySql> {
    let mut builder = select_from(LINK_COLUMNS, "short_links");
    if let Some(active) = query.filter().is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    push_keyset(&mut builder, query);
    builder
}

fn user_scan_sql(query: &KeysetQuery<UserFilter>) -> QueryBuilder<'static, MySql> {
    let filter = query.filter();
    let mut builder = select_from(USER_COLUMNS, "users");
    if !filter.include_deleted {
        builder.push(" AND is_deleted = FALSE");
    }
    if let Some(role_id) = filter.role_id {
        builder.push(" AND role_id = ").push_bind(role_id.get());
    }
    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    push_keyset(&mut builder, query);
    builder
}

fn role_scan_sql(query: &KeysetQuery<RoleFilter>) -> QueryBuilder<'static, MySql> {
    let filter = query.filter();
    let mut builder = select_from(ROLE_COLUMNS, "roles");
    if !filter.include_deleted {
        builder.push(" AND is_deleted = FALSE");
    }
    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    push_keyset(&mut builder, query);
    builder
}

// `updated_by` is kept when no editor is given; it also anchors the SET list.
fn user_update_sql(
    id: RecordId,
    patch: &UserPatch,
    updated_by: Option<String>,
) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new("UPDATE users SET updated_by = COALESCE(");
    builder.push_bind(updated_by).push(", updated_by)");
    if let Some(fullname) = &patch.fullname {
        builder.push(", fullname = ").push_bind(fullname.clone());
    }
    if let Some(role_id) = patch.role_id {
        builder.push(", role_id = ").push_bind(role_id.get());
    }
    if let Some(email) = &patch.email {
        builder.push(", email = ").push_bind(email.clone());
    }
    if let Some(password_hash) = &patch.password_hash {
        builder.push(", password_hash = ").push_bind(password_hash.clone());
    }
    if let Some(active) = patch.is_active {
        builder.push(", is_active = ").push_bind(active);
    }
    builder
        .push(" WHERE id = ")
        .push_bind(id.get())
        .push(" AND is_deleted = FALSE");
    builder
}

fn role_update_sql(
    id: RecordId,
    patch: &RolePatch,
    updated_by: Option<String>,
) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new("UPDATE roles SET updated_by = COALESCE(");
    builder.push_bind(updated_by).push(", updated_by)");
    if let Some(name) = &patch.name {
        builder.push(", name = ").push_bind(name.clone());
    }
    if let Some(description) = &patch.description {
        builder.push(", description = ").push_bind(description.clone());
    }
    if let Some(active) = patch.is_active {
        builder.push(", is_active = ").push_bind(active);
    }
    builder
        .push(" WHERE id = ")
        .push_bind(id.get())
        .push(" AND is_deleted = FALSE");
    builder
}

fn select_live_by_id(columns: &str, table: &str, id: RecordId) -> QueryBuilder<'static, MySql> {
    let mut builder = select_from(columns, table);
    builder
        .push(" AND id = ")
        .push_bind(id.get())
        .push(" AND is_deleted = FALSE");
    builder
}

fn link_from_row(row: &MySqlRow) -> Result<LinkRecord> {
    let redirect_type: u16 = row.try_get("redirect_type").map_err(map_sqlx_error)?;
    let expire_at: Option<i64> = row.try_get("expire_at").map_err(map_sqlx_error)?;
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;

    Ok(LinkRecord {
        id: RecordId::new(row.try_get("id").map_err(map_sqlx_error)?),
        code: ShortCode::new_unchecked(short_code),
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        clicks: row.try_get("clicks").map_err(map_sqlx_error)?,
        is_active: row.try_get("is_active").map_err(map_sqlx_error)?,
        expire_at: expire_at.map(from_micros).transpose()?,
        redirect_type: RedirectType::try_from(redirect_type).map_err(StorageError::InvalidData)?,
        created_at: from_micros(row.try_get("created_at").map_err(map_sqlx_error)?)?,
    })
}

fn user_from_row(row: &MySqlRow) -> Result<UserRecord> {
    Ok(UserRecord {
        id: RecordId::new(row.try_get("id").map_err(map_sqlx_error)?),
        fullname: row.try_get("fullname").map_err(map_sqlx_error)?,
        role_id: RecordId::new(row.try_get("role_id").map_err(map_sqlx_error)?),
        email: row.try_get("email").map_err(map_sqlx_error)?,
        password_hash: row.try_get("password_hash").map_err(map_sqlx_error)?,
        is_active: row.try_get("is_active").map_err(map_sqlx_error)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
        created_by: row.try_get("created_by").map_err(map_sqlx_error)?,
        updated_by: row.try_get("updated_by").map_err(map_sqlx_error)?,
        created_at: from_micros(row.try_get("created_at").map_err(map_sqlx_error)?)?,
    })
}

fn role_from_row(row: &MySqlRow) -> Result<RoleRecord> {
    Ok(RoleRecord {
        id: RecordId::new(row.try_get("id").map_err(map_sqlx_error)?),
        name: row.try_get("name").map_err(map_sqlx_error)?,
        description: row.try_get("description").map_err(map_sqlx_error)?,
        is_active: row.try_get("is_active").map_err(map_sqlx_error)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
        created_by: row.try_get("created_by").map_err(map_sqlx_error)?,
        updated_by: row.try_get("updated_by").map_err(map_sqlx_error)?,
        created_at: from_micros(row.try_get("created_at").map_err(map_sqlx_error)?)?,
    })
}

impl MySqlStore {
    async fn fetch_rows<T>(
        &self,
        mut builder: QueryBuilder<'static, MySql>,
        decode: fn(&MySqlRow) -> Result<T>,
    ) -> Result<Vec<T>> {
        trace!(sql = builder.sql(), "running keyset scan");
        builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .iter()
            .map(decode)
            .collect()
    }
}

#[async_trait]
impl KeysetSource<LinkFilter> for MySqlStore {
    type Item = LinkRecord;

    async fn scan(&self, query: &KeysetQuery<LinkFilter>) -> Result<Vec<LinkRecord>> {
        self.fetch_rows(link_scan_sql(query), link_from_row).await
    }
}

#[async_trait]
impl LinkRepository for MySqlStore {
    async fn insert(&self, link: NewLink) -> Result<LinkRecord> {
        let created_at = to_micros(link.created_at);
        let expire_at = link.expire_at.map(to_micros);

        let result = sqlx::query(
            r#"
            INSERT INTO short_links
                (short_code, original_url, clicks, is_active, expire_at, redirect_type, created_at)
            VALUES (?, ?, 0, TRUE, ?, ?, ?)
            "#,
        )
        .bind(link.code.as_str())
        .bind(link.original_url.as_str())
        .bind(expire_at)
        .bind(link.redirect_type.status_code())
        .bind(created_at)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => RecordId::new(done.last_insert_id()),
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::Conflict(link.code.to_string()))
            }
            Err(err) => return Err(map_sqlx_error(err)),
        };

        // Hand back what a later read would return, at storage precision.
        let stored = NewLink {
            created_at: from_micros(created_at)?,
            expire_at: expire_at.map(from_micros).transpose()?,
            ..link
        };
        Ok(stored.into_record(id))
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM short_links WHERE short_code = ? LIMIT 1"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(link_from_row).transpose()
    }

    async fn redeem(&self, code: &ShortCode, now: Timestamp) -> Result<Option<Redirection>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // The conditional UPDATE both validates and increments under the
        // row lock; the SELECT below reads the row we now hold locked.
        let updated = sqlx::query(
            r#"
            UPDATE short_links
            SET clicks = clicks + 1
            WHERE short_code = ?
              AND is_active = TRUE
              AND (expire_at IS NULL OR expire_at > ?)
            "#,
        )
        .bind(code.as_str())
        .bind(to_micros(now))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            debug!(code = %code, "no redeemable link");
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            SELECT original_url, redirect_type
            FROM short_links
            WHERE short_code = ?
            "#,
        )
        .bind(code.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let redirect_type: u16 = row.try_get("redirect_type").map_err(map_sqlx_error)?;
        Ok(Some(Redirection {
            original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
            redirect_type: RedirectType::try_from(redirect_type)
                .map_err(StorageError::InvalidData)?,
        }))
    }

    async fn deactivate(&self, code: &ShortCode) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE short_links
            SET is_active = FALSE
            WHERE short_code = ?
              AND is_active = TRUE
            "#,
        )
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl KeysetSource<UserFilter> for MySqlStore {
    type Item = UserRecord;

    async fn scan(&self, query: &KeysetQuery<UserFilter>) -> Result<Vec<UserRecord>> {
        self.fetch_rows(user_scan_sql(query), user_from_row).await
    }
}

#[async_trait]
impl UserRepository for MySqlStore {
    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let created_at = to_micros(user.created_at);

        // Inserts nothing unless the role row exists and is live.
        let result = sqlx::query(
            r#"
            INSERT INTO users
                (fullname, role_id, email, password_hash, is_active, is_deleted, created_by, created_at)
            SELECT ?, id, ?, ?, TRUE, FALSE, ?, ?
            FROM roles
            WHERE id = ?
              AND is_deleted = FALSE
            "#,
        )
        .bind(user.fullname.as_str())
        .bind(user.email.as_str())
        .bind(user.password_hash.as_str())
        .bind(user.created_by.as_deref())
        .bind(created_at)
        .bind(user.role_id.get())
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) if done.rows_affected() == 0 => {
                return Err(StorageError::MissingReference(format!("role {}", user.role_id)))
            }
            Ok(done) => RecordId::new(done.last_insert_id()),
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::Conflict(user.email))
            }
            Err(err) => return Err(map_sqlx_error(err)),
        };

        let stored = NewUser {
            created_at: from_micros(created_at)?,
            ..user
        };
        Ok(stored.into_record(id))
    }

    async fn get(&self, id: RecordId, include_deleted: bool) -> Result<Option<UserRecord>> {
        let mut builder = select_from(USER_COLUMNS, "users");
        builder.push(" AND id = ").push_bind(id.get());
        if !include_deleted {
            builder.push(" AND is_deleted = FALSE");
        }

        let rows = self.fetch_rows(builder, user_from_row).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_email(
        &self,
        email: &str,
        include_deleted: bool,
    ) -> Result<Option<UserRecord>> {
        let mut builder = select_from(USER_COLUMNS, "users");
        builder.push(" AND email = ").push_bind(email.to_owned());
        if !include_deleted {
            builder.push(" AND is_deleted = FALSE");
        }
        builder.push(" ORDER BY is_deleted ASC, created_at DESC, id DESC LIMIT 1");

        let rows = self.fetch_rows(builder, user_from_row).await?;
        Ok(rows.into_iter().next())
    }

    async fn update(
        &self,
        id: RecordId,
        patch: UserPatch,
        updated_by: Option<String>,
    ) -> Result<Option<UserRecord>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        if let Some(role_id) = patch.role_id {
            // Held until commit, so the role cannot be deleted underneath.
            let role = sqlx::query(
                r#"
                SELECT id
                FROM roles
                WHERE id = ?
                  AND is_deleted = FALSE
                FOR SHARE
                "#,
            )
            .bind(role_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            if role.is_none() {
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Err(StorageError::MissingReference(format!("role {role_id}")));
            }
        }

        let result = user_update_sql(id, &patch, updated_by)
            .build()
            .execute(&mut *tx)
            .await;
        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::Conflict(patch.email.unwrap_or_default()))
            }
            Err(err) => return Err(map_sqlx_error(err)),
        }

        let row = select_live_by_id(USER_COLUMNS, "users", id)
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn soft_delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_deleted = TRUE, is_active = FALSE, updated_by = ?
            WHERE id = ?
              AND is_deleted = FALSE
            "#,
        )
        .bind(deleted_by)
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl KeysetSource<RoleFilter> for MySqlStore {
    type Item = RoleRecord;

    async fn scan(&self, query: &KeysetQuery<RoleFilter>) -> Result<Vec<RoleRecord>> {
        self.fetch_rows(role_scan_sql(query), role_from_row).await
    }
}

#[async_trait]
impl RoleRepository for MySqlStore {
    async fn insert(&self, role: NewRole) -> Result<RoleRecord> {
        let created_at = to_micros(role.created_at);

        let done = sqlx::query(
            r#"
            INSERT INTO roles
                (name, description, is_active, is_deleted, created_by, created_at)
            VALUES (?, ?, TRUE, FALSE, ?, ?)
            "#,
        )
        .bind(role.name.as_str())
        .bind(role.description.as_deref())
        .bind(role.created_by.as_deref())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let stored = NewRole {
            created_at: from_micros(created_at)?,
            ..role
        };
        Ok(stored.into_record(RecordId::new(done.last_insert_id())))
    }

    async fn get(&self, id: RecordId, include_deleted: bool) -> Result<Option<RoleRecord>> {
        let mut builder = select_from(ROLE_COLUMNS, "roles");
        builder.push(" AND id = ").push_bind(id.get());
        if !include_deleted {
            builder.push(" AND is_deleted = FALSE");
        }

        let rows = self.fetch_rows(builder, role_from_row).await?;
        Ok(rows.into_iter().next())
    }

    async fn update(
        &self,
        id: RecordId,
        patch: RolePatch,
        updated_by: Option<String>,
    ) -> Result<Option<RoleRecord>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        role_update_sql(id, &patch, updated_by)
            .build()
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let row = select_live_by_id(ROLE_COLUMNS, "roles", id)
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        row.as_ref().map(role_from_row).transpose()
    }

    async fn soft_delete(&self, id: RecordId, deleted_by: Option<String>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET is_deleted = TRUE, is_active = FALSE, updated_by = ?
            WHERE id = ?
              AND is_deleted = FALSE
            "#,
        )
        .bind(deleted_by)
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
