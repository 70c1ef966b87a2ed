//! HTTP API surface: request handlers and response models.

pub mod handlers;
pub mod models;
