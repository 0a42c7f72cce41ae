use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::EstimatesConfig;
use crate::cpq::catalog::CatalogIndex;
use crate::cpq::compat::RuleBasedResolver;
use crate::cpq::pricing::{DeterministicPricingEngine, PricingEngine};
use crate::cpq::{BuildEvaluation, BuildEvaluationInput, CpqRuntime, DeterministicCpqRuntime};
use crate::domain::estimate::{
    Customer, Estimate, EstimateDraft, EstimateId, EstimatePatch, EstimateStatus, OrderRequest,
};
use crate::domain::line::{LineItem, ServiceLine};
use crate::domain::model::{ModelId, SavedModel};
use crate::errors::{DomainError, ErrorKind};
use crate::library::ModelLibrary;

use super::engine::{missing_required_fields, EstimateLifecycle};
use super::repository::EstimateRepository;

/// Read-modify-write attempts before a contended estimate surfaces a version conflict.
const MAX_COMMIT_ATTEMPTS: usize = 4;

/// Knobs from the `[estimates]` config section that shape service behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EstimatePolicy {
    pub default_validity_days: u32,
    pub enforce_required_fields: bool,
    pub allow_delete_converted: bool,
}

impl Default for EstimatePolicy {
    fn default() -> Self {
        Self {
            default_validity_days: 7,
            enforce_required_fields: true,
            allow_delete_converted: false,
        }
    }
}

impl From<&EstimatesConfig> for EstimatePolicy {
    fn from(config: &EstimatesConfig) -> Self {
        Self {
            default_validity_days: config.default_validity_days,
            enforce_required_fields: config.enforce_required_fields,
            allow_delete_converted: config.allow_delete_converted,
        }
    }
}

/// Id-addressed estimate operations over a repository. Each call loads the current version,
/// runs the pure lifecycle step and saves the result only when it succeeds and the stored
/// version is still the one it read.
pub struct EstimateService<R, S, P = DeterministicPricingEngine> {
    repository: R,
    lifecycle: EstimateLifecycle<P>,
    audit_sink: S,
    policy: EstimatePolicy,
}

impl<R, S> EstimateService<R, S, DeterministicPricingEngine>
where
    R: EstimateRepository,
    S: AuditSink,
{
    pub fn with_defaults(repository: R, audit_sink: S) -> Self {
        Self::new(repository, EstimateLifecycle::default(), audit_sink, EstimatePolicy::default())
    }
}

impl<R, S, P> EstimateService<R, S, P>
where
    R: EstimateRepository,
    S: AuditSink,
    P: PricingEngine,
{
    pub fn new(
        repository: R,
        lifecycle: EstimateLifecycle<P>,
        audit_sink: S,
        policy: EstimatePolicy,
    ) -> Self {
        Self { repository, lifecycle, audit_sink, policy }
    }

    pub fn policy(&self) -> EstimatePolicy {
        self.policy
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Blank draft carrying the configured validity window.
    pub fn draft(&self, customer: Customer, issued_on: NaiveDate) -> EstimateDraft {
        EstimateDraft {
            id: None,
            customer,
            issued_on,
            validity_days: self.policy.default_validity_days,
            notes: String::new(),
        }
    }

    pub fn create(
        &self,
        draft: EstimateDraft,
        lines: Vec<LineItem>,
        services: Vec<ServiceLine>,
        context: &AuditContext,
    ) -> Result<Estimate, DomainError> {
        if let Some(id) = draft.id.as_ref() {
            if self.repository.find_by_id(id).is_some() {
                return Err(DomainError::Validation(format!("estimate `{}` already exists", id.0)));
            }
        }
        if draft.validity_days == 0 {
            return Err(DomainError::Validation("validity_days must be at least 1".to_string()));
        }

        let estimate = self.lifecycle.create(draft, lines, services, &context.actor, Utc::now())?;
        self.repository.save_if_version(estimate.clone(), None)?;

        info!(
            event_name = "estimate.created",
            correlation_id = %context.correlation_id,
            estimate_id = %estimate.id().0,
            line_count = estimate.lines().len(),
            total = %estimate.totals().total,
            "estimate created"
        );
        self.emit(
            AuditEvent::new(
                Some(estimate.id().clone()),
                context,
                "estimate.created",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
            )
            .with_metadata("version", estimate.version().to_string()),
        );
        Ok(estimate)
    }

    pub fn get(&self, id: &EstimateId) -> Result<Estimate, DomainError> {
        self.repository
            .find_by_id(id)
            .ok_or_else(|| DomainError::not_found("estimate", id.0.clone()))
    }

    /// Every stored estimate, optionally narrowed to one status, newest first.
    pub fn list(&self, status: Option<EstimateStatus>) -> Vec<Estimate> {
        let mut estimates: Vec<Estimate> = self
            .repository
            .list()
            .into_iter()
            .filter(|estimate| status.map_or(true, |status| estimate.status() == status))
            .collect();
        estimates.sort_by(|left, right| {
            right.created_at().cmp(&left.created_at()).then_with(|| left.id().cmp(right.id()))
        });
        estimates
    }

    pub fn update(
        &self,
        id: &EstimateId,
        patch: EstimatePatch,
        audit_label: &str,
        context: &AuditContext,
    ) -> Result<Estimate, DomainError> {
        self.update_with(id, audit_label, context, |_| Ok(patch.clone()))
    }

    pub fn transition(
        &self,
        id: &EstimateId,
        next_status: EstimateStatus,
        context: &AuditContext,
    ) -> Result<Estimate, DomainError> {
        let (current, (), next) =
            self.commit(id, "estimate.transition_rejected", context, |current| {
                self.gate_leaving_draft(current, next_status)?;
                let next =
                    self.lifecycle.transition(current, next_status, &context.actor, Utc::now())?;
                Ok(((), next))
            })?;
        self.applied(&current, &next, context);
        Ok(next)
    }

    pub fn convert_to_order(
        &self,
        id: &EstimateId,
        context: &AuditContext,
    ) -> Result<(OrderRequest, Estimate), DomainError> {
        let (current, order, converted) =
            self.commit(id, "estimate.transition_rejected", context, |current| {
                self.lifecycle.convert_to_order(current, &context.actor, Utc::now())
            })?;
        self.applied(&current, &converted, context);
        Ok((order, converted))
    }

    pub fn delete(&self, id: &EstimateId, context: &AuditContext) -> Result<Estimate, DomainError> {
        let mut attempt = 1;
        let removed = loop {
            let current = self.get(id)?;
            if current.status() == EstimateStatus::Converted && !self.policy.allow_delete_converted
            {
                let error = DomainError::EstimateLocked {
                    id: current.id().clone(),
                    status: current.status(),
                    operation: "deleted",
                };
                self.rejected(&current, &error, "estimate.delete_rejected", context);
                return Err(error);
            }

            match self.repository.remove_if_version(id, current.version()) {
                Ok(removed) => break removed,
                Err(DomainError::VersionConflict { found, .. })
                    if attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    self.retrying(&current, found, attempt, context);
                    attempt += 1;
                }
                Err(error) => {
                    self.rejected(&current, &error, "estimate.delete_rejected", context);
                    return Err(error);
                }
            }
        };

        info!(
            event_name = "estimate.deleted",
            correlation_id = %context.correlation_id,
            estimate_id = %removed.id().0,
            status = removed.status().as_str(),
            "estimate deleted"
        );
        self.emit(
            AuditEvent::new(
                Some(removed.id().clone()),
                context,
                "estimate.deleted",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
            )
            .with_metadata("status", removed.status().as_str()),
        );
        Ok(removed)
    }

    /// Expires every sent or accepted estimate whose validity window has closed at `now`.
    /// An estimate written concurrently during the sweep keeps the newer write and is
    /// reconsidered on the next sweep.
    pub fn expire_due(&self, now: DateTime<Utc>, context: &AuditContext) -> Vec<Estimate> {
        let mut expired = Vec::new();
        for estimate in self.repository.list() {
            let Some(next) = self.lifecycle.expire_if_due(&estimate, now) else {
                continue;
            };
            match self.repository.save_if_version(next.clone(), Some(estimate.version())) {
                Ok(()) => {
                    self.applied(&estimate, &next, context);
                    expired.push(next);
                }
                Err(error) => warn!(
                    event_name = "estimate.expiry_skipped",
                    correlation_id = %context.correlation_id,
                    estimate_id = %estimate.id().0,
                    error = %error,
                    "estimate changed during expiry sweep"
                ),
            }
        }

        if !expired.is_empty() {
            info!(
                event_name = "estimate.expiry_sweep",
                correlation_id = %context.correlation_id,
                expired_count = expired.len(),
                "expired estimates past their validity window"
            );
        }
        expired
    }

    /// Appends fresh copies of a saved model's lines to the estimate.
    pub fn apply_model(
        &self,
        id: &EstimateId,
        library: &ModelLibrary,
        model_id: &ModelId,
        context: &AuditContext,
    ) -> Result<Estimate, DomainError> {
        let model_name = library.get(model_id)?.name.clone();
        self.update_with(id, &format!("Loaded model {model_name}"), context, |current| {
            let mut lines = current.lines().to_vec();
            lines.extend(library.load(model_id)?);
            Ok(EstimatePatch { lines: Some(lines), ..EstimatePatch::default() })
        })
    }

    pub fn save_as_model(
        &self,
        id: &EstimateId,
        name: &str,
        library: &mut ModelLibrary,
        context: &AuditContext,
    ) -> Result<SavedModel, DomainError> {
        let current = self.get(id)?;
        let model = library.save(name, current.lines())?;
        self.emit(
            AuditEvent::new(
                Some(current.id().clone()),
                context,
                "library.model_saved",
                AuditCategory::Library,
                AuditOutcome::Success,
            )
            .with_metadata("model_id", model.id.0.clone()),
        );
        Ok(model)
    }

    /// Offerable parts and a priced trace for the estimate's current lines.
    pub fn evaluate_build(
        &self,
        id: &EstimateId,
        catalog: &CatalogIndex,
        filter_compatible: bool,
    ) -> Result<BuildEvaluation, DomainError> {
        let current = self.get(id)?;
        let runtime =
            DeterministicCpqRuntime::new(RuleBasedResolver, self.lifecycle.pricing_engine());
        runtime.evaluate_build(BuildEvaluationInput {
            catalog,
            lines: current.lines(),
            services: current.services(),
            filter_compatible,
        })
    }

    fn update_with(
        &self,
        id: &EstimateId,
        audit_label: &str,
        context: &AuditContext,
        patch_for: impl Fn(&Estimate) -> Result<EstimatePatch, DomainError>,
    ) -> Result<Estimate, DomainError> {
        let (_, (), updated) = self.commit(id, "estimate.update_rejected", context, |current| {
            let patch = patch_for(current)?;
            if patch.validity_days == Some(0) {
                return Err(DomainError::Validation(
                    "validity_days must be at least 1".to_string(),
                ));
            }
            let next =
                self.lifecycle.update(current, patch, audit_label, &context.actor, Utc::now())?;
            Ok(((), next))
        })?;

        info!(
            event_name = "estimate.updated",
            correlation_id = %context.correlation_id,
            estimate_id = %updated.id().0,
            version = updated.version(),
            total = %updated.totals().total,
            "estimate updated"
        );
        self.emit(
            AuditEvent::new(
                Some(updated.id().clone()),
                context,
                "estimate.updated",
                AuditCategory::Pricing,
                AuditOutcome::Success,
            )
            .with_metadata("version", updated.version().to_string())
            .with_metadata("total", updated.totals().total.to_string()),
        );
        Ok(updated)
    }

    /// Loads the stored estimate, runs `step` on it and writes the result only if nobody else
    /// wrote in between. A lost race re-runs the step on the fresh version.
    fn commit<T>(
        &self,
        id: &EstimateId,
        rejected_event: &'static str,
        context: &AuditContext,
        step: impl Fn(&Estimate) -> Result<(T, Estimate), DomainError>,
    ) -> Result<(Estimate, T, Estimate), DomainError> {
        let mut attempt = 1;
        loop {
            let current = self.get(id)?;
            let (output, next) = match step(&current) {
                Ok(stepped) => stepped,
                Err(error) => {
                    self.rejected(&current, &error, rejected_event, context);
                    return Err(error);
                }
            };

            match self.repository.save_if_version(next.clone(), Some(current.version())) {
                Ok(()) => return Ok((current, output, next)),
                Err(DomainError::VersionConflict { found, .. })
                    if attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    self.retrying(&current, found, attempt, context);
                    attempt += 1;
                }
                Err(error) => {
                    self.rejected(&current, &error, rejected_event, context);
                    return Err(error);
                }
            }
        }
    }

    fn retrying(&self, current: &Estimate, found: u32, attempt: usize, context: &AuditContext) {
        warn!(
            event_name = "estimate.version_conflict",
            correlation_id = %context.correlation_id,
            estimate_id = %current.id().0,
            expected = current.version(),
            found,
            attempt,
            "estimate changed while writing; retrying on the newer version"
        );
    }

    fn gate_leaving_draft(
        &self,
        current: &Estimate,
        next_status: EstimateStatus,
    ) -> Result<(), DomainError> {
        let leaves_draft = current.status() == EstimateStatus::Draft
            && current.status().can_transition_to(next_status);
        if !leaves_draft || !self.policy.enforce_required_fields {
            return Ok(());
        }

        let missing_fields = missing_required_fields(current);
        if missing_fields.is_empty() {
            Ok(())
        } else {
            Err(DomainError::MissingRequiredFields { missing_fields })
        }
    }

    fn settle(
        &self,
        current: &Estimate,
        result: Result<Estimate, DomainError>,
        rejected_event: &'static str,
        context: &AuditContext,
    ) -> Result<Estimate, DomainError> {
        result.map_err(|error| {
            self.rejected(current, &error, rejected_event, context);
            error
        })
    }

    fn applied(&self, from: &Estimate, to: &Estimate, context: &AuditContext) {
        info!(
            event_name = "estimate.transition_applied",
            correlation_id = %context.correlation_id,
            estimate_id = %to.id().0,
            from = from.status().as_str(),
            to = to.status().as_str(),
            version = to.version(),
            "estimate status changed"
        );
        self.emit(
            AuditEvent::new(
                Some(to.id().clone()),
                context,
                "estimate.transition_applied",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
            )
            .with_metadata("from", from.status().as_str())
            .with_metadata("to", to.status().as_str())
            .with_metadata("version", to.version().to_string()),
        );
    }

    fn rejected(
        &self,
        current: &Estimate,
        error: &DomainError,
        event_type: &'static str,
        context: &AuditContext,
    ) {
        let outcome = if error.kind() == ErrorKind::Conflict {
            AuditOutcome::Failed
        } else {
            AuditOutcome::Rejected
        };
        warn!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            estimate_id = %current.id().0,
            status = current.status().as_str(),
            error = %error,
            "estimate operation rejected"
        );
        self.emit(
            AuditEvent::new(
                Some(current.id().clone()),
                context,
                event_type,
                AuditCategory::Lifecycle,
                outcome,
            )
            .with_metadata("status", current.status().as_str())
            .with_metadata("reason", error.to_string()),
        );
    }

    fn emit(&self, event: AuditEvent) {
        self.audit_sink.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::cpq::catalog::CatalogIndex;
    use crate::domain::catalog::{CombinationRule, Part, PartId, RuleId, RuleKind, RuleMember};
    use crate::domain::estimate::{Customer, Estimate, EstimateId, EstimatePatch, EstimateStatus};
    use crate::domain::line::LineItem;
    use crate::errors::{DomainError, ErrorKind};
    use crate::library::ModelLibrary;
    use crate::lifecycle::engine::EstimateLifecycle;
    use crate::lifecycle::repository::{EstimateRepository, InMemoryEstimateRepository};

    use super::{EstimatePolicy, EstimateService};

    type Service = EstimateService<InMemoryEstimateRepository, InMemoryAuditSink>;

    /// Widens the window between reading an estimate and writing it back.
    #[derive(Default)]
    struct SlowReads(InMemoryEstimateRepository);

    impl EstimateRepository for SlowReads {
        fn find_by_id(&self, id: &EstimateId) -> Option<Estimate> {
            thread::sleep(Duration::from_millis(50));
            self.0.find_by_id(id)
        }

        fn save_if_version(
            &self,
            estimate: Estimate,
            expected_version: Option<u32>,
        ) -> Result<(), DomainError> {
            self.0.save_if_version(estimate, expected_version)
        }

        fn remove_if_version(
            &self,
            id: &EstimateId,
            expected_version: u32,
        ) -> Result<Estimate, DomainError> {
            self.0.remove_if_version(id, expected_version)
        }

        fn list(&self) -> Vec<Estimate> {
            self.0.list()
        }
    }

    fn part(id: &str, category: &str, price: i64) -> Part {
        Part {
            id: PartId(id.to_owned()),
            name: id.to_owned(),
            sku: id.to_ascii_uppercase(),
            category: category.to_owned(),
            unit_price: Decimal::new(price, 0),
            mrp: Decimal::new(price, 0),
            tax_rate_pct: Decimal::new(18, 0),
            stock_quantity: 4,
            active: true,
            model_number: None,
        }
    }

    fn customer() -> Customer {
        Customer {
            name: "Ravi Menon".to_owned(),
            mobile: "9811122233".to_owned(),
            email: Some("ravi@example.com".to_owned()),
            address: None,
        }
    }

    fn context() -> AuditContext {
        AuditContext::new("req-1", "counter-1")
    }

    fn service_with(policy: EstimatePolicy) -> (Service, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        let service = EstimateService::new(
            InMemoryEstimateRepository::default(),
            EstimateLifecycle::<crate::cpq::pricing::DeterministicPricingEngine>::default(),
            sink.clone(),
            policy,
        );
        (service, sink)
    }

    fn issued_on() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 1).expect("date")
    }

    fn create_complete(service: &Service) -> EstimateId {
        let lines = vec![LineItem::from_part(&part("cpu-1", "CPU", 1000), 1)];
        service
            .create(service.draft(customer(), issued_on()), lines, Vec::new(), &context())
            .expect("create")
            .id()
            .clone()
    }

    #[test]
    fn create_uses_configured_validity_and_emits_audit() {
        let (service, sink) = service_with(EstimatePolicy {
            default_validity_days: 15,
            ..EstimatePolicy::default()
        });
        let id = create_complete(&service);

        let stored = service.get(&id).expect("stored");
        assert_eq!(stored.validity_days(), 15);
        assert_eq!(stored.totals().total, Decimal::new(1180, 0));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "estimate.created");
        assert_eq!(events[0].correlation_id, "req-1");
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (service, _) = service_with(EstimatePolicy::default());
        let missing = EstimateId("EST-MISSING".to_owned());

        let error = service
            .update(&missing, EstimatePatch::default(), "Edit", &context())
            .expect_err("missing estimate");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(
            service.transition(&missing, EstimateStatus::Sent, &context()).map(|_| ()),
            Err(DomainError::not_found("estimate", "EST-MISSING"))
        );
    }

    #[test]
    fn leaving_draft_requires_customer_and_lines() {
        let (service, sink) = service_with(EstimatePolicy::default());
        let incomplete = service
            .create(
                service.draft(Customer::default(), issued_on()),
                Vec::new(),
                Vec::new(),
                &context(),
            )
            .expect("create");

        let error = service
            .transition(incomplete.id(), EstimateStatus::Sent, &context())
            .expect_err("missing fields");
        assert_eq!(
            error,
            DomainError::MissingRequiredFields {
                missing_fields: vec![
                    "customer.name".to_owned(),
                    "customer.mobile".to_owned(),
                    "lines".to_owned(),
                ],
            }
        );
        assert_eq!(service.get(incomplete.id()).expect("stored").status(), EstimateStatus::Draft);

        let last = sink.events().pop().expect("rejection event");
        assert_eq!(last.event_type, "estimate.transition_rejected");
        assert_eq!(last.outcome, AuditOutcome::Rejected);
    }

    #[test]
    fn required_field_gate_can_be_disabled() {
        let (service, _) = service_with(EstimatePolicy {
            enforce_required_fields: false,
            ..EstimatePolicy::default()
        });
        let incomplete = service
            .create(
                service.draft(Customer::default(), issued_on()),
                Vec::new(),
                Vec::new(),
                &context(),
            )
            .expect("create");

        let sent = service
            .transition(incomplete.id(), EstimateStatus::Sent, &context())
            .expect("gate disabled");
        assert_eq!(sent.status(), EstimateStatus::Sent);
    }

    #[test]
    fn invalid_edges_are_reported_before_missing_fields() {
        let (service, _) = service_with(EstimatePolicy::default());
        let incomplete = service
            .create(
                service.draft(Customer::default(), issued_on()),
                Vec::new(),
                Vec::new(),
                &context(),
            )
            .expect("create");

        let error = service
            .transition(incomplete.id(), EstimateStatus::Converted, &context())
            .expect_err("draft -> converted");
        assert_eq!(error.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn converted_estimates_are_locked_against_edit_and_delete() {
        let (service, _) = service_with(EstimatePolicy::default());
        let id = create_complete(&service);
        service.transition(&id, EstimateStatus::Sent, &context()).expect("send");
        let (order, converted) = service.convert_to_order(&id, &context()).expect("convert");

        assert_eq!(order.estimate_id, id);
        assert_eq!(converted.version(), 3);

        let late = EstimatePatch { notes: Some("late".to_owned()), ..Default::default() };
        let edit = service.update(&id, late, "", &context()).expect_err("locked");
        assert!(matches!(edit, DomainError::EstimateLocked { operation: "edited", .. }));

        let delete = service.delete(&id, &context()).expect_err("locked");
        assert!(matches!(delete, DomainError::EstimateLocked { operation: "deleted", .. }));
        assert!(service.get(&id).is_ok());
    }

    #[test]
    fn converted_estimates_can_be_deleted_when_allowed() {
        let (service, _) = service_with(EstimatePolicy {
            allow_delete_converted: true,
            ..EstimatePolicy::default()
        });
        let id = create_complete(&service);
        service.transition(&id, EstimateStatus::Sent, &context()).expect("send");
        service.convert_to_order(&id, &context()).expect("convert");

        service.delete(&id, &context()).expect("delete");
        assert_eq!(
            service.get(&id).map(|_| ()).map_err(|error| error.kind()),
            Err(ErrorKind::NotFound)
        );
    }

    #[test]
    fn expiry_sweep_only_touches_open_estimates_past_validity() {
        let (service, sink) = service_with(EstimatePolicy::default());
        let draft_id = create_complete(&service);
        let sent_id = create_complete(&service);
        service.transition(&sent_id, EstimateStatus::Sent, &context()).expect("send");

        let before = Utc.with_ymd_and_hms(2026, 10, 8, 12, 0, 0).single().expect("timestamp");
        assert!(service.expire_due(before, &context()).is_empty());

        let after = Utc.with_ymd_and_hms(2026, 10, 9, 0, 0, 1).single().expect("timestamp");
        let expired = service.expire_due(after, &context());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id(), &sent_id);
        assert_eq!(service.get(&draft_id).expect("draft").status(), EstimateStatus::Draft);
        assert_eq!(service.list(Some(EstimateStatus::Expired)).len(), 1);

        let last = sink.events().pop().expect("event");
        assert_eq!(last.metadata.get("to").map(String::as_str), Some("expired"));
    }

    #[test]
    fn concurrent_updates_both_land_on_successive_versions() {
        let sink = InMemoryAuditSink::default();
        let service = EstimateService::new(
            SlowReads::default(),
            EstimateLifecycle::<crate::cpq::pricing::DeterministicPricingEngine>::default(),
            sink.clone(),
            EstimatePolicy::default(),
        );
        let id = service
            .create(service.draft(customer(), issued_on()), Vec::new(), Vec::new(), &context())
            .expect("create")
            .id()
            .clone();

        thread::scope(|scope| {
            for notes in ["first", "second"] {
                let (service, id) = (&service, &id);
                scope.spawn(move || {
                    let patch =
                        EstimatePatch { notes: Some(notes.to_owned()), ..Default::default() };
                    service.update(id, patch, "Notes", &context()).expect("update");
                });
            }
        });

        let stored = service.get(&id).expect("stored");
        assert_eq!(stored.version(), 3);
        assert_eq!(stored.audit_trail().len(), 3);
        let updates =
            sink.events().iter().filter(|event| event.event_type == "estimate.updated").count();
        assert_eq!(updates, 2);
    }

    /// Another writer always gets in first.
    #[derive(Default)]
    struct AlwaysContended(InMemoryEstimateRepository);

    impl EstimateRepository for AlwaysContended {
        fn find_by_id(&self, id: &EstimateId) -> Option<Estimate> {
            self.0.find_by_id(id)
        }

        fn save_if_version(
            &self,
            estimate: Estimate,
            expected_version: Option<u32>,
        ) -> Result<(), DomainError> {
            match expected_version {
                None => self.0.save_if_version(estimate, None),
                Some(expected) => Err(DomainError::VersionConflict {
                    id: estimate.id().clone(),
                    expected,
                    found: expected + 1,
                }),
            }
        }

        fn remove_if_version(
            &self,
            id: &EstimateId,
            expected_version: u32,
        ) -> Result<Estimate, DomainError> {
            self.0.remove_if_version(id, expected_version)
        }

        fn list(&self) -> Vec<Estimate> {
            self.0.list()
        }
    }

    #[test]
    fn persistent_contention_surfaces_a_failed_conflict() {
        let sink = InMemoryAuditSink::default();
        let service = EstimateService::new(
            AlwaysContended::default(),
            EstimateLifecycle::<crate::cpq::pricing::DeterministicPricingEngine>::default(),
            sink.clone(),
            EstimatePolicy::default(),
        );
        let id = service
            .create(service.draft(customer(), issued_on()), Vec::new(), Vec::new(), &context())
            .expect("create")
            .id()
            .clone();

        let patch = EstimatePatch { notes: Some("rush".to_owned()), ..Default::default() };
        let error = service.update(&id, patch, "Notes", &context()).expect_err("never wins");
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert_eq!(service.get(&id).expect("stored").version(), 1);

        let last = sink.events().pop().expect("failure event");
        assert_eq!(last.event_type, "estimate.update_rejected");
        assert_eq!(last.outcome, AuditOutcome::Failed);
    }

    #[test]
    fn stale_deletes_recheck_the_converted_lock() {
        let (service, _) = service_with(EstimatePolicy::default());
        let id = create_complete(&service);
        let stale = service.get(&id).expect("stored");
        service.transition(&id, EstimateStatus::Sent, &context()).expect("send");
        service.convert_to_order(&id, &context()).expect("convert");

        let error = service
            .repository()
            .remove_if_version(&id, stale.version())
            .expect_err("stale version");
        assert_eq!(error.kind(), ErrorKind::Conflict);

        let locked = service.delete(&id, &context()).expect_err("locked");
        assert!(matches!(locked, DomainError::EstimateLocked { .. }));
        assert!(service.get(&id).is_ok());
    }

    #[test]
    fn models_round_trip_through_estimates() {
        let (service, _) = service_with(EstimatePolicy::default());
        let mut library = ModelLibrary::new();
        let source = create_complete(&service);
        let model =
            service.save_as_model(&source, "Starter CPU", &mut library, &context()).expect("save");

        let target = create_complete(&service);
        let updated =
            service.apply_model(&target, &library, &model.id, &context()).expect("apply model");

        assert_eq!(updated.lines().len(), 2);
        assert_ne!(updated.lines()[0].id, updated.lines()[1].id);
        assert!(updated.lines()[0].same_content(&updated.lines()[1]));
        assert_eq!(updated.totals().total, Decimal::new(2360, 0));
        assert_eq!(
            updated.audit_trail().last().map(|entry| entry.action.as_str()),
            Some("Loaded model Starter CPU")
        );
    }

    #[test]
    fn build_evaluation_follows_estimate_lines() {
        let (service, _) = service_with(EstimatePolicy::default());
        let catalog = CatalogIndex::new(
            vec![
                part("cpu-1", "CPU", 1000),
                part("mb-1", "Motherboard", 800),
                part("mb-2", "Motherboard", 900),
            ],
            Vec::new(),
        )
        .with_rules(vec![
            CombinationRule {
                id: RuleId("am5".to_owned()),
                name: "AM5 pairing".to_owned(),
                active: true,
                kind: RuleKind::Include,
                members: vec![
                    RuleMember::Part(PartId("cpu-1".to_owned())),
                    RuleMember::Part(PartId("mb-1".to_owned())),
                ],
            },
            CombinationRule {
                id: RuleId("am4".to_owned()),
                name: "AM4 pairing".to_owned(),
                active: true,
                kind: RuleKind::Include,
                members: vec![
                    RuleMember::Part(PartId("cpu-2".to_owned())),
                    RuleMember::Part(PartId("mb-2".to_owned())),
                ],
            },
        ]);
        let id = create_complete(&service);

        let evaluation = service.evaluate_build(&id, &catalog, true).expect("evaluation");
        let offered: Vec<&str> =
            evaluation.offerable_parts.iter().map(|part| part.id.0.as_str()).collect();
        assert_eq!(offered, vec!["cpu-1", "mb-1"]);
        assert_eq!(evaluation.pricing.totals.total, Decimal::new(1180, 0));

        let everything = service.evaluate_build(&id, &catalog, false).expect("evaluation");
        assert_eq!(everything.offerable_parts.len(), 3);
    }
}
