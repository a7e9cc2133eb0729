pub mod get_progress;
pub mod get_status;

pub use get_progress::{GetProgressError, GetProgressQuery, GetProgressResponse};
pub use get_status::{GetStatusError, GetStatusQuery, GetStatusResponse, RESULT_URL_TTL};
