pub mod assemble;
pub mod classify;
pub mod metrics;
pub mod preprocess;
pub mod select;
pub mod strategies;
