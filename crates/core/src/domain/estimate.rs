use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::line::{LineItem, ServiceLine};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EstimateId(pub String);

impl EstimateId {
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(format!("EST-{}", raw[..12].to_ascii_uppercase()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    Draft,
    Sent,
    Accepted,
    Converted,
    Expired,
}

impl EstimateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Converted => "converted",
            Self::Expired => "expired",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Sent => "Sent",
            Self::Accepted => "Accepted",
            Self::Converted => "Converted",
            Self::Expired => "Expired",
        }
    }

    pub fn can_transition_to(&self, next: EstimateStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Sent)
                | (Self::Sent, Self::Accepted)
                | (Self::Accepted, Self::Converted)
                | (Self::Sent, Self::Expired)
                | (Self::Accepted, Self::Expired)
        )
    }

    pub fn can_convert(&self) -> bool {
        matches!(self, Self::Sent | Self::Accepted)
    }

    /// Statuses whose validity window still runs.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Sent | Self::Accepted)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub mobile: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: String,
    pub actor: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateTotals {
    pub parts_subtotal: Decimal,
    pub parts_tax: Decimal,
    pub services_subtotal: Decimal,
    pub services_tax: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl EstimateTotals {
    /// Presentation copy rounded half away from zero and padded to exactly `scale` decimal
    /// places.
    pub fn rounded(&self, scale: u32) -> Self {
        let round = |value: Decimal| {
            let mut rounded =
                value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
            rounded.rescale(scale);
            rounded
        };
        Self {
            parts_subtotal: round(self.parts_subtotal),
            parts_tax: round(self.parts_tax),
            services_subtotal: round(self.services_subtotal),
            services_tax: round(self.services_tax),
            subtotal: round(self.subtotal),
            tax: round(self.tax),
            total: round(self.total),
        }
    }
}

/// Caller-supplied fields for a new estimate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateDraft {
    #[serde(default)]
    pub id: Option<EstimateId>,
    pub customer: Customer,
    pub issued_on: NaiveDate,
    pub validity_days: u32,
    #[serde(default)]
    pub notes: String,
}

/// Partial edit. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatePatch {
    pub customer: Option<Customer>,
    pub issued_on: Option<NaiveDate>,
    pub validity_days: Option<u32>,
    pub notes: Option<String>,
    pub lines: Option<Vec<LineItem>>,
    pub services: Option<Vec<ServiceLine>>,
}

impl EstimatePatch {
    pub fn touches_lines(&self) -> bool {
        self.lines.is_some() || self.services.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.customer.is_none()
            && self.issued_on.is_none()
            && self.validity_days.is_none()
            && self.notes.is_none()
            && !self.touches_lines()
    }
}

/// Versioned quotation document. Totals are only ever written together with the lines they
/// were computed from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    id: EstimateId,
    customer: Customer,
    issued_on: NaiveDate,
    validity_days: u32,
    notes: String,
    status: EstimateStatus,
    lines: Vec<LineItem>,
    services: Vec<ServiceLine>,
    totals: EstimateTotals,
    version: u32,
    audit_trail: Vec<AuditEntry>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Estimate {
    pub(crate) fn new_draft(
        id: EstimateId,
        draft: EstimateDraft,
        lines: Vec<LineItem>,
        services: Vec<ServiceLine>,
        totals: EstimateTotals,
        entry: AuditEntry,
    ) -> Self {
        let at = entry.at;
        Self {
            id,
            customer: draft.customer,
            issued_on: draft.issued_on,
            validity_days: draft.validity_days,
            notes: draft.notes,
            status: EstimateStatus::Draft,
            lines,
            services,
            totals,
            version: 1,
            audit_trail: vec![entry],
            created_at: at,
            updated_at: at,
        }
    }

    pub fn id(&self) -> &EstimateId {
        &self.id
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn issued_on(&self) -> NaiveDate {
        self.issued_on
    }

    pub fn validity_days(&self) -> u32 {
        self.validity_days
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn status(&self) -> EstimateStatus {
        self.status
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn services(&self) -> &[ServiceLine] {
        &self.services
    }

    pub fn totals(&self) -> &EstimateTotals {
        &self.totals
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn audit_trail(&self) -> &[AuditEntry] {
        &self.audit_trail
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// First instant at which the estimate is past its validity window: midnight UTC after
    /// the last valid day.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let last_valid_day = self.issued_on.checked_add_days(Days::new(self.validity_days.into()))?;
        let boundary = last_valid_day.succ_opt()?.and_hms_opt(0, 0, 0)?;
        Some(boundary.and_utc())
    }

    pub fn is_past_validity(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| now >= expires_at)
    }

    pub(crate) fn apply_fields(&mut self, patch: &EstimatePatch) {
        if let Some(customer) = &patch.customer {
            self.customer = customer.clone();
        }
        if let Some(issued_on) = patch.issued_on {
            self.issued_on = issued_on;
        }
        if let Some(validity_days) = patch.validity_days {
            self.validity_days = validity_days;
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
    }

    pub(crate) fn replace_lines(
        &mut self,
        lines: Vec<LineItem>,
        services: Vec<ServiceLine>,
        totals: EstimateTotals,
    ) {
        self.lines = lines;
        self.services = services;
        self.totals = totals;
    }

    pub(crate) fn set_status(&mut self, status: EstimateStatus) {
        self.status = status;
    }

    pub(crate) fn record(&mut self, entry: AuditEntry) {
        self.updated_at = entry.at;
        self.version += 1;
        self.audit_trail.push(entry);
    }
}

/// Order creation request handed to the order-management collaborator on conversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub estimate_id: EstimateId,
    pub estimate_version: u32,
    pub customer: Customer,
    pub lines: Vec<LineItem>,
    pub services: Vec<ServiceLine>,
    pub totals: EstimateTotals,
    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{EstimateStatus, EstimateTotals};

    #[test]
    fn only_forward_edges_are_allowed() {
        use EstimateStatus::*;

        assert!(Draft.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Converted));
        assert!(Sent.can_transition_to(Expired));
        assert!(Accepted.can_transition_to(Expired));

        assert!(!Draft.can_transition_to(Converted));
        assert!(!Draft.can_transition_to(Expired));
        assert!(!Sent.can_transition_to(Draft));
        assert!(!Converted.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Sent));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let totals = EstimateTotals {
            parts_subtotal: Decimal::new(10_005, 3),
            parts_tax: Decimal::new(1_8009, 4),
            ..EstimateTotals::default()
        };

        let rounded = totals.rounded(2);
        assert_eq!(rounded.parts_subtotal, Decimal::new(1_001, 2));
        assert_eq!(rounded.parts_tax, Decimal::new(180, 2));
        assert_eq!(rounded.parts_tax.to_string(), "1.80");
        assert_eq!(rounded.total.to_string(), "0.00");
    }
}
