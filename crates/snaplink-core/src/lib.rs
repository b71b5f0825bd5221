//! Core types and traits for the snaplink backend.
//!
//! This crate provides the shared domain records, the keyset pagination
//! machinery (cursor codec, query builder, page assembler) and the
//! repository contracts implemented by `snaplink-storage`.

pub mod cursor;
pub mod error;
pub mod keyset;
pub mod page;
pub mod record;
pub mod repository;
pub mod shortcode;

pub use cursor::{Cursor, Position};
pub use error::{PaginationError, StorageError};
pub use keyset::KeysetQuery;
pub use page::{list_page, Page, PageInfo, PageLimits};
pub use record::{
    LinkFilter, LinkRecord, NewLink, NewRole, NewUser, RecordId, Redirection, RedirectType,
    RoleFilter, RolePatch, RoleRecord, UserFilter, UserPatch, UserRecord,
};
pub use repository::{KeysetSource, LinkRepository, RoleRepository, UserRepository};
pub use shortcode::ShortCode;
