//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, session context)
//! 2. Delegates to a service or runs a scoped query
//! 3. Returns an HTTP response (JSON, status code, cookies)

pub mod auth;
pub mod billing;
pub mod chat;
pub mod company;
pub mod conversations;
pub mod dashboard;
pub mod health;
pub mod invoices;
pub mod jobs;
