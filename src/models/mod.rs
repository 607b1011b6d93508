pub mod job;
pub mod result;
pub mod types;
pub mod upload;

pub use job::{ForecastJob, ForecastRequest, JobQueryParams, JobStatus, ModelChoice, SelectionMode};
pub use result::{ForecastPoint, ForecastResult, HistoricalPoint, ModelResult, StrategyMetrics};
pub use types::{PaginatedResponse, Pagination};
pub use upload::{TimeCandidate, Upload};
