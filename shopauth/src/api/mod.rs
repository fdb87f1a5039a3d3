//! HTTP surface: request/response models, extractors and route handlers.

pub mod extractors;
pub mod handlers;
pub mod models;
