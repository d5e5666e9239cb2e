//! Request and response bodies

pub mod accounts;
pub mod payments;
pub mod reports;
pub mod subscriptions;

use serde::Serialize;

/// Successful response envelope: `{ "success": true, ..data }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}
