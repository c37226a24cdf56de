//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and calls to Stripe,
//! the completion API and the mail server.

pub mod auth_service;
pub mod billing_service;
pub mod chat_service;
pub mod company_service;
pub mod completion_client;
pub mod dashboard_service;
pub mod email_service;
pub mod invoice_service;
pub mod password;
pub mod session;
pub mod subscription_service;
