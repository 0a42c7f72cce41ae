use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::PartId;
use crate::domain::line::{LineItem, LineItemId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Line content stored by a saved model, without the estimate-specific line id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelLine {
    pub part_id: PartId,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub tax_rate_pct: Decimal,
    pub discount_pct: Decimal,
}

impl From<&LineItem> for ModelLine {
    fn from(line: &LineItem) -> Self {
        Self {
            part_id: line.part_id.clone(),
            name: line.name.clone(),
            sku: line.sku.clone(),
            category: line.category.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            tax_rate_pct: line.tax_rate_pct,
            discount_pct: line.discount_pct,
        }
    }
}

impl ModelLine {
    pub fn instantiate(&self) -> LineItem {
        LineItem {
            id: LineItemId::generate(),
            part_id: self.part_id.clone(),
            name: self.name.clone(),
            sku: self.sku.clone(),
            category: self.category.clone(),
            unit_price: self.unit_price,
            quantity: self.quantity,
            tax_rate_pct: self.tax_rate_pct,
            discount_pct: self.discount_pct,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub id: ModelId,
    pub name: String,
    pub lines: Vec<ModelLine>,
    pub created_at: DateTime<Utc>,
}
