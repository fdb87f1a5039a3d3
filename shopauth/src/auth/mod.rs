//! Authentication and authorization.
//!
//! # Authentication
//!
//! Login and registration issue a pair of HS256 tokens ([`tokens`]) signed with separate
//! secrets. The access token goes to the client as the `accessToken` cookie and in the response
//! body; the refresh token is kept only in the user's session row ([`service`]). Each user has at
//! most one session, and every refresh rotates both tokens.
//!
//! Requests present the access token either as the cookie or as `Authorization: Bearer <token>`
//! ([`cookies`]). When it has expired, [`middleware::require_auth`] uses the session's refresh
//! token to rotate the session and sends the new cookie back with the response.
//!
//! # Authorization
//!
//! Routes may carry a rule in the [`policy::AccessPolicy`]: a required action, an optional role
//! allowlist, and whether the rule is scoped to a product. The [`permissions::PermissionEngine`]
//! answers against a role → category → actions table; admins bypass every check.

pub mod cookies;
pub mod current_user;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod service;
pub mod tokens;
