//! HTTP surface shared by all features

pub mod health;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
