pub mod jobs;
pub mod uploads;

pub use jobs::{JobStore, PgJobStore};
pub use uploads::UploadRepo;
