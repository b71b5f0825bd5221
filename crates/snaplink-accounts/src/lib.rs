//! User and role administration.
//!
//! Both services validate input, delegate uniqueness to the store and list
//! through the same keyset pagination as short links.

pub mod error;
pub mod roles;
pub mod users;
pub mod validation;

pub use error::{AccountError, Result};
pub use roles::{CreateRole, RoleService, UpdateRole};
pub use users::{CreateUser, UpdateUser, UserService};
