//! Data models representing database entities and API bodies.

pub mod billing;
pub mod company;
pub mod conversation;
pub mod invoice;
pub mod job;
/// Plan tiers, subscription statuses and feature gating
pub mod plan;
pub mod user;
