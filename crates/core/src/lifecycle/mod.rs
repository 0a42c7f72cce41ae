pub mod engine;
pub mod repository;
pub mod service;

pub use engine::{missing_required_fields, EstimateLifecycle, SYSTEM_ACTOR};
pub use repository::{EstimateRepository, InMemoryEstimateRepository};
pub use service::{EstimatePolicy, EstimateService};
