use chrono::{DateTime, Utc};

use crate::cpq::pricing::{DeterministicPricingEngine, PricingEngine};
use crate::domain::estimate::{
    AuditEntry, Estimate, EstimateDraft, EstimateId, EstimatePatch, EstimateStatus, OrderRequest,
};
use crate::domain::line::{LineItem, ServiceLine};
use crate::errors::DomainError;

pub const CREATED_ACTION: &str = "Created";
pub const CONVERTED_ACTION: &str = "Converted to order";
pub const SYSTEM_ACTOR: &str = "system";

/// Pure estimate state machine. Every operation takes the current estimate by reference and
/// hands back the next version; the input is never modified, so a rejected call leaves the
/// caller's copy exactly as it was.
#[derive(Clone, Debug, Default)]
pub struct EstimateLifecycle<P = DeterministicPricingEngine> {
    pricing_engine: P,
}

impl<P> EstimateLifecycle<P>
where
    P: PricingEngine,
{
    pub fn new(pricing_engine: P) -> Self {
        Self { pricing_engine }
    }

    pub fn pricing_engine(&self) -> &P {
        &self.pricing_engine
    }

    pub fn create(
        &self,
        draft: EstimateDraft,
        lines: Vec<LineItem>,
        services: Vec<ServiceLine>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Estimate, DomainError> {
        let totals = self.pricing_engine.price(&lines, &services)?.totals;
        let id = draft.id.clone().unwrap_or_else(EstimateId::generate);

        let created = entry(CREATED_ACTION, actor, at);
        Ok(Estimate::new_draft(id, draft, lines, services, totals, created))
    }

    pub fn update(
        &self,
        estimate: &Estimate,
        patch: EstimatePatch,
        audit_label: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Estimate, DomainError> {
        if estimate.status() == EstimateStatus::Converted {
            return Err(DomainError::EstimateLocked {
                id: estimate.id().clone(),
                status: estimate.status(),
                operation: "edited",
            });
        }

        let mut next = estimate.clone();
        next.apply_fields(&patch);

        if patch.touches_lines() {
            let lines = patch.lines.unwrap_or_else(|| estimate.lines().to_vec());
            let services = patch.services.unwrap_or_else(|| estimate.services().to_vec());
            let totals = self.pricing_engine.price(&lines, &services)?.totals;
            next.replace_lines(lines, services, totals);
        }

        let label = audit_label.trim();
        next.record(entry(if label.is_empty() { "Updated" } else { label }, actor, at));
        Ok(next)
    }

    pub fn transition(
        &self,
        estimate: &Estimate,
        next_status: EstimateStatus,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Estimate, DomainError> {
        if !estimate.status().can_transition_to(next_status) {
            return Err(DomainError::InvalidTransition {
                from: estimate.status(),
                to: next_status,
            });
        }

        let mut next = estimate.clone();
        next.set_status(next_status);
        next.record(entry(&format!("Status changed to {}", next_status.label()), actor, at));
        Ok(next)
    }

    /// Moves a sent or accepted estimate to `Converted` and builds the order request for the
    /// order-management collaborator. Confirmation happens before this is called.
    pub fn convert_to_order(
        &self,
        estimate: &Estimate,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(OrderRequest, Estimate), DomainError> {
        if !estimate.status().can_convert() {
            return Err(DomainError::InvalidTransition {
                from: estimate.status(),
                to: EstimateStatus::Converted,
            });
        }

        let mut next = estimate.clone();
        next.set_status(EstimateStatus::Converted);
        next.record(entry(CONVERTED_ACTION, actor, at));

        let order = OrderRequest {
            estimate_id: next.id().clone(),
            estimate_version: next.version(),
            customer: next.customer().clone(),
            lines: next.lines().to_vec(),
            services: next.services().to_vec(),
            totals: *next.totals(),
            requested_at: at,
        };
        Ok((order, next))
    }

    /// Returns the expired version when `now` is past the validity window of a sent or
    /// accepted estimate.
    pub fn expire_if_due(&self, estimate: &Estimate, now: DateTime<Utc>) -> Option<Estimate> {
        if !estimate.status().is_open() || !estimate.is_past_validity(now) {
            return None;
        }

        self.transition(estimate, EstimateStatus::Expired, SYSTEM_ACTOR, now).ok()
    }
}

/// Fields a caller must collect before an estimate may leave `Draft`.
pub fn missing_required_fields(estimate: &Estimate) -> Vec<String> {
    let mut missing = Vec::new();
    if estimate.customer().name.trim().is_empty() {
        missing.push("customer.name".to_string());
    }
    if estimate.customer().mobile.trim().is_empty() {
        missing.push("customer.mobile".to_string());
    }
    if estimate.lines().is_empty() {
        missing.push("lines".to_string());
    }
    missing
}

fn entry(action: &str, actor: &str, at: DateTime<Utc>) -> AuditEntry {
    AuditEntry { at, action: action.to_string(), actor: actor.to_string() }
}
