use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// A hardware component offered by the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub unit_price: Decimal,
    pub mrp: Decimal,
    pub tax_rate_pct: Decimal,
    #[serde(default)]
    pub stock_quantity: i64,
    pub active: bool,
    /// Manufacturer model number, matched by catalog search.
    #[serde(default)]
    pub model_number: Option<String>,
}

/// Labor or add-on offering billed per unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub tax_rate_pct: Decimal,
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    #[default]
    Include,
    Exclude,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleMember {
    Category(String),
    Part(PartId),
}

impl RuleMember {
    pub fn matches(&self, part_id: &PartId, category: Option<&str>) -> bool {
        match self {
            Self::Part(id) => id == part_id,
            Self::Category(name) => {
                category.is_some_and(|category| category.eq_ignore_ascii_case(name))
            }
        }
    }
}

/// Pairing constraint between categories and parts. Every member of an include rule is
/// compatible with every other member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationRule {
    pub id: RuleId,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub kind: RuleKind,
    pub members: Vec<RuleMember>,
}

impl CombinationRule {
    pub fn mentions(&self, part: &Part) -> bool {
        self.members.iter().any(|member| member.matches(&part.id, Some(&part.category)))
    }
}
