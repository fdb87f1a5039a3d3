//! Data access layer.
//!
//! ```text
//! ┌──────────────┐
//! │ AuthService  │  (auth::service)
//! └──────┬───────┘
//!        │  UserStore / SessionStore / ResourceClassResolver
//!        ↓
//! ┌──────────────┐      ┌──────────────┐
//! │  PgUsers ... │  or  │ InMemoryStore│
//! └──────┬───────┘      └──────────────┘
//!        ↓
//! ┌──────────────┐
//! │  PostgreSQL  │
//! └──────────────┘
//! ```
//!
//! - [`handlers`]: storage traits and PostgreSQL implementations
//! - [`in_memory`]: single-lock in-memory implementation of every trait
//! - [`models`]: database record structures matching table schemas
//! - [`errors`]: database-specific error types

pub mod errors;
pub mod handlers;
pub mod in_memory;
pub mod models;
