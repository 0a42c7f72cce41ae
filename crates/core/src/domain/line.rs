use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::{Part, PartId, Service, ServiceId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineItemId(pub String);

impl LineItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceLineId(pub String);

impl ServiceLineId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Priced snapshot of a part inside an estimate. Detached from the catalog entry it was
/// copied from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub part_id: PartId,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub tax_rate_pct: Decimal,
    #[serde(default)]
    pub discount_pct: Decimal,
}

impl LineItem {
    pub fn from_part(part: &Part, quantity: u32) -> Self {
        Self {
            id: LineItemId::generate(),
            part_id: part.id.clone(),
            name: part.name.clone(),
            sku: part.sku.clone(),
            category: part.category.clone(),
            unit_price: part.unit_price,
            quantity,
            tax_rate_pct: part.tax_rate_pct,
            discount_pct: Decimal::ZERO,
        }
    }

    pub fn with_discount(mut self, discount_pct: Decimal) -> Self {
        self.discount_pct = discount_pct;
        self
    }

    /// True when both lines carry the same priced content, ignoring line ids.
    pub fn same_content(&self, other: &LineItem) -> bool {
        self.part_id == other.part_id
            && self.name == other.name
            && self.sku == other.sku
            && self.category == other.category
            && self.unit_price == other.unit_price
            && self.quantity == other.quantity
            && self.tax_rate_pct == other.tax_rate_pct
            && self.discount_pct == other.discount_pct
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub id: ServiceLineId,
    pub service_id: ServiceId,
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub tax_rate_pct: Decimal,
}

impl ServiceLine {
    pub fn from_service(service: &Service, quantity: u32) -> Self {
        Self {
            id: ServiceLineId::generate(),
            service_id: service.id.clone(),
            name: service.name.clone(),
            unit: service.unit.clone(),
            unit_price: service.unit_price,
            quantity,
            tax_rate_pct: service.tax_rate_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::catalog::{Part, PartId};

    use super::LineItem;

    #[test]
    fn snapshot_is_isolated_from_later_catalog_changes() {
        let mut part = Part {
            id: PartId("cpu-7600".to_owned()),
            name: "Ryzen 5 7600".to_owned(),
            sku: "CPU-7600".to_owned(),
            category: "CPU".to_owned(),
            unit_price: Decimal::new(19_500, 0),
            mrp: Decimal::new(22_000, 0),
            tax_rate_pct: Decimal::new(18, 0),
            stock_quantity: 10,
            active: true,
            model_number: Some("100-100001015BOX".to_owned()),
        };

        let line = LineItem::from_part(&part, 1);
        part.unit_price = Decimal::new(21_000, 0);

        assert_eq!(line.unit_price, Decimal::new(19_500, 0));
        assert_eq!(line.discount_pct, Decimal::ZERO);
    }

    #[test]
    fn fresh_lines_from_the_same_part_get_distinct_ids() {
        let part = Part {
            id: PartId("ram-32".to_owned()),
            name: "32GB DDR5".to_owned(),
            sku: "RAM-32".to_owned(),
            category: "Memory".to_owned(),
            unit_price: Decimal::new(9_000, 0),
            mrp: Decimal::new(9_900, 0),
            tax_rate_pct: Decimal::new(18, 0),
            stock_quantity: 3,
            active: true,
            model_number: None,
        };

        let first = LineItem::from_part(&part, 2);
        let second = LineItem::from_part(&part, 2);

        assert_ne!(first.id, second.id);
        assert!(first.same_content(&second));
    }
}
