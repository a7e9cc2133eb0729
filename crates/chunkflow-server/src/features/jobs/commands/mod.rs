pub mod create;

pub use create::{CreateJobCommand, CreateJobError, CreateJobResponse};
