//! Storage backends for snaplink.
//!
//! Both backends implement every repository contract from `snaplink_core`:
//! [`InMemoryStore`] for tests and single-process demos, [`MySqlStore`] for
//! durable deployments.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryStore;
pub use mysql::MySqlStore;
pub use snaplink_core::error::StorageError;
pub use snaplink_core::{KeysetSource, LinkRepository, RoleRepository, UserRepository};
