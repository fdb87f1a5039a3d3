//! Storage traits and their PostgreSQL implementations.

pub mod products;
pub mod sessions;
pub mod users;

pub use products::{PgProducts, ResourceClassResolver, ResourceRef};
pub use sessions::{PgSessions, SessionStore};
pub use users::{PgUsers, UserStore};
