//! HTTP middleware components.

/// Session cookie authentication middleware
pub mod auth;
