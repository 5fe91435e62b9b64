//! API models for request and response payloads

pub mod admin;
pub mod page;
pub mod stats;
