use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cpq::catalog::CatalogIndex;
use crate::domain::catalog::{CombinationRule, Part, PartId, RuleId, RuleKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityQuery {
    pub selected: BTreeSet<PartId>,
    /// When false the resolver ignores rules and offers the whole active catalog.
    pub filter_compatible: bool,
}

impl Default for CompatibilityQuery {
    fn default() -> Self {
        Self { selected: BTreeSet::new(), filter_compatible: true }
    }
}

impl CompatibilityQuery {
    pub fn new<I>(selected: I) -> Self
    where
        I: IntoIterator<Item = PartId>,
    {
        Self { selected: selected.into_iter().collect(), filter_compatible: true }
    }

    pub fn show_all(mut self) -> Self {
        self.filter_compatible = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub parts: Vec<Part>,
    pub triggered_rules: Vec<RuleId>,
    pub pass_through: bool,
}

pub trait CompatibilityResolver: Send + Sync {
    fn compatible_parts(&self, catalog: &CatalogIndex, query: &CompatibilityQuery) -> Vec<Part>;
}

#[derive(Default)]
pub struct RuleBasedResolver;

impl CompatibilityResolver for RuleBasedResolver {
    fn compatible_parts(&self, catalog: &CatalogIndex, query: &CompatibilityQuery) -> Vec<Part> {
        resolve_compatibility(catalog, query).parts
    }
}

pub fn compatible_parts(catalog: &CatalogIndex, query: &CompatibilityQuery) -> Vec<Part> {
    resolve_compatibility(catalog, query).parts
}

/// Offers every active part that a triggered include rule names, plus every active part no
/// active include rule mentions at all. Triggered exclude rules only remove parts that no
/// triggered include rule offers.
pub fn resolve_compatibility(
    catalog: &CatalogIndex,
    query: &CompatibilityQuery,
) -> CompatibilityReport {
    let active_parts = catalog.active_parts();
    let active_rules = catalog.active_rules();

    if !query.filter_compatible || query.selected.is_empty() || active_rules.is_empty() {
        return CompatibilityReport {
            parts: active_parts.into_iter().cloned().collect(),
            triggered_rules: Vec::new(),
            pass_through: true,
        };
    }

    let triggered: Vec<&CombinationRule> = active_rules
        .iter()
        .copied()
        .filter(|rule| query.selected.iter().any(|id| selection_triggers(catalog, rule, id)))
        .collect();

    let offered_by = |kind: RuleKind| {
        triggered
            .iter()
            .filter(|rule| rule.kind == kind)
            .flat_map(|rule| {
                active_parts.iter().filter(move |part| rule.mentions(part)).map(|part| &part.id)
            })
            .collect::<BTreeSet<&PartId>>()
    };
    let included = offered_by(RuleKind::Include);
    let excluded = offered_by(RuleKind::Exclude);

    let parts = active_parts
        .iter()
        .filter(|part| {
            if included.contains(&part.id) {
                return true;
            }
            if excluded.contains(&part.id) && !query.selected.contains(&part.id) {
                return false;
            }
            !active_rules
                .iter()
                .any(|rule| rule.kind == RuleKind::Include && rule.mentions(part))
        })
        .map(|part| (*part).clone())
        .collect();

    CompatibilityReport {
        parts,
        triggered_rules: triggered.iter().map(|rule| rule.id.clone()).collect(),
        pass_through: false,
    }
}

fn selection_triggers(catalog: &CatalogIndex, rule: &CombinationRule, id: &PartId) -> bool {
    let category = catalog.find_part(id).ok().map(|part| part.category.as_str());
    rule.members.iter().any(|member| member.matches(id, category))
}
