pub mod audit;
pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod library;
pub mod lifecycle;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use cpq::{
    catalog::{CatalogIndex, CatalogSnapshot},
    compat::{compatible_parts, CompatibilityQuery, CompatibilityResolver, RuleBasedResolver},
    pricing::{price_lines, DeterministicPricingEngine, PricingEngine, PricingResult},
    BuildEvaluation, BuildEvaluationInput, CpqRuntime, DeterministicCpqRuntime,
};
pub use domain::{
    catalog::{CombinationRule, Part, PartId, RuleKind, RuleMember, Service, ServiceId},
    estimate::{
        Customer, Estimate, EstimateDraft, EstimateId, EstimatePatch, EstimateStatus,
        EstimateTotals, OrderRequest,
    },
    line::{LineItem, ServiceLine},
    model::{ModelId, SavedModel},
};
pub use errors::{ApplicationError, DomainError, ErrorKind};
pub use library::ModelLibrary;
pub use lifecycle::{
    missing_required_fields, EstimateLifecycle, EstimatePolicy, EstimateRepository,
    EstimateService, InMemoryEstimateRepository,
};
