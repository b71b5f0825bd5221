use crate::cursor::{Keyed, Position};
use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Store-assigned unique identifier of a record.
///
/// Identifiers are never reused, which is what lets them break ties between
/// records sharing a creation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HTTP status used when redirecting through a short link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RedirectType {
    #[default]
    MovedPermanently,
    Found,
    TemporaryRedirect,
    PermanentRedirect,
}

impl RedirectType {
    pub const fn status_code(self) -> u16 {
        match self {
            RedirectType::MovedPermanently => 301,
            RedirectType::Found => 302,
            RedirectType::TemporaryRedirect => 307,
            RedirectType::PermanentRedirect => 308,
        }
    }
}

impl TryFrom<u16> for RedirectType {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            301 => Ok(RedirectType::MovedPermanently),
            302 => Ok(RedirectType::Found),
            307 => Ok(RedirectType::TemporaryRedirect),
            308 => Ok(RedirectType::PermanentRedirect),
            other => Err(format!("unsupported redirect status {other}")),
        }
    }
}

impl From<RedirectType> for u16 {
    fn from(value: RedirectType) -> Self {
        value.status_code()
    }
}

/// A stored short link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: RecordId,
    pub code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// Number of successful redemptions. Only ever incremented.
    pub clicks: u64,
    /// Cleared by administrative soft delete; never touched by redirects.
    pub is_active: bool,
    /// When the link stops redirecting, if ever.
    pub expire_at: Option<Timestamp>,
    pub redirect_type: RedirectType,
    pub created_at: Timestamp,
}

impl LinkRecord {
    /// Whether a redirect through this link at `now` is allowed.
    pub fn is_redeemable_at(&self, now: Timestamp) -> bool {
        self.is_active && self.expire_at.is_none_or(|expire_at| expire_at > now)
    }
}

impl Keyed for LinkRecord {
    fn position(&self) -> Position {
        Position::new(self.created_at, self.id)
    }
}

/// A short link about to be inserted. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub code: ShortCode,
    pub original_url: String,
    pub expire_at: Option<Timestamp>,
    pub redirect_type: RedirectType,
    pub created_at: Timestamp,
}

impl NewLink {
    pub fn into_record(self, id: RecordId) -> LinkRecord {
        LinkRecord {
            id,
            code: self.code,
            original_url: self.original_url,
            clicks: 0,
            is_active: true,
            expire_at: self.expire_at,
            redirect_type: self.redirect_type,
            created_at: self.created_at,
        }
    }
}

/// Outcome of a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirection {
    pub original_url: String,
    pub redirect_type: RedirectType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFilter {
    pub is_active: Option<bool>,
}

impl LinkFilter {
    pub fn matches(&self, record: &LinkRecord) -> bool {
        self.is_active.is_none_or(|active| record.is_active == active)
    }
}

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: RecordId,
    pub fullname: String,
    pub role_id: RecordId,
    /// Normalized (trimmed, lowercase) address.
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Timestamp,
}

impl Keyed for UserRecord {
    fn position(&self) -> Position {
        Position::new(self.created_at, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub fullname: String,
    pub role_id: RecordId,
    pub email: String,
    pub password_hash: String,
    pub created_by: Option<String>,
    pub created_at: Timestamp,
}

impl NewUser {
    pub fn into_record(self, id: RecordId) -> UserRecord {
        UserRecord {
            id,
            fullname: self.fullname,
            role_id: self.role_id,
            email: self.email,
            password_hash: self.password_hash,
            is_active: true,
            is_deleted: false,
            created_by: self.created_by,
            updated_by: None,
            created_at: self.created_at,
        }
    }
}

/// Changes to a live user. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub fullname: Option<String>,
    pub role_id: Option<RecordId>,
    /// Already normalized.
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.fullname.is_none()
            && self.role_id.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.is_active.is_none()
    }

    pub fn apply(&self, user: &mut UserRecord) {
        if let Some(fullname) = &self.fullname {
            user.fullname.clone_from(fullname);
        }
        if let Some(role_id) = self.role_id {
            user.role_id = role_id;
        }
        if let Some(email) = &self.email {
            user.email.clone_from(email);
        }
        if let Some(password_hash) = &self.password_hash {
            user.password_hash.clone_from(password_hash);
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub include_deleted: bool,
    pub role_id: Option<RecordId>,
    pub is_active: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, record: &UserRecord) -> bool {
        (self.include_deleted || !record.is_deleted)
            && self.role_id.is_none_or(|role_id| record.role_id == role_id)
            && self.is_active.is_none_or(|active| record.is_active == active)
    }
}

/// A stored role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Timestamp,
}

impl Keyed for RoleRecord {
    fn position(&self) -> Position {
        Position::new(self.created_at, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Timestamp,
}

impl NewRole {
    pub fn into_record(self, id: RecordId) -> RoleRecord {
        RoleRecord {
            id,
            name: self.name,
            description: self.description,
            is_active: true,
            is_deleted: false,
            created_by: self.created_by,
            updated_by: None,
            created_at: self.created_at,
        }
    }
}

/// Changes to a live role. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl RolePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.is_active.is_none()
    }

    pub fn apply(&self, role: &mut RoleRecord) {
        if let Some(name) = &self.name {
            role.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            role.description.clone_from(description);
        }
        if let Some(is_active) = self.is_active {
            role.is_active = is_active;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    pub include_deleted: bool,
    pub is_active: Option<bool>,
}

impl RoleFilter {
    pub fn matches(&self, record: &RoleRecord) -> bool {
        (self.include_deleted || !record.is_deleted)
            && self.is_active.is_none_or(|active| record.is_active == active)
    }
}
