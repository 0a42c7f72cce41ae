pub mod catalog;
pub mod compat;
pub mod pricing;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::Part;
use crate::domain::line::{LineItem, ServiceLine};
use crate::errors::DomainError;

use self::{
    catalog::CatalogIndex,
    compat::{CompatibilityQuery, CompatibilityResolver, RuleBasedResolver},
    pricing::{DeterministicPricingEngine, PricingEngine, PricingResult},
};

/// A build in progress: the lines already chosen plus the presentation toggle for rule
/// filtering.
#[derive(Clone, Debug)]
pub struct BuildEvaluationInput<'a> {
    pub catalog: &'a CatalogIndex,
    pub lines: &'a [LineItem],
    pub services: &'a [ServiceLine],
    pub filter_compatible: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildEvaluation {
    pub offerable_parts: Vec<Part>,
    pub pricing: PricingResult,
}

pub trait CpqRuntime: Send + Sync {
    fn evaluate_build(&self, input: BuildEvaluationInput<'_>)
        -> Result<BuildEvaluation, DomainError>;
}

pub struct DeterministicCpqRuntime<C, P> {
    resolver: C,
    pricing_engine: P,
}

impl<C, P> DeterministicCpqRuntime<C, P> {
    pub fn new(resolver: C, pricing_engine: P) -> Self {
        Self { resolver, pricing_engine }
    }

    pub fn pricing_engine(&self) -> &P {
        &self.pricing_engine
    }
}

impl Default for DeterministicCpqRuntime<RuleBasedResolver, DeterministicPricingEngine> {
    fn default() -> Self {
        Self::new(RuleBasedResolver, DeterministicPricingEngine)
    }
}

impl<C, P> CpqRuntime for DeterministicCpqRuntime<C, P>
where
    C: CompatibilityResolver,
    P: PricingEngine,
{
    fn evaluate_build(
        &self,
        input: BuildEvaluationInput<'_>,
    ) -> Result<BuildEvaluation, DomainError> {
        let mut query =
            CompatibilityQuery::new(input.lines.iter().map(|line| line.part_id.clone()));
        query.filter_compatible = input.filter_compatible;

        let offerable_parts = self.resolver.compatible_parts(input.catalog, &query);
        let pricing = self.pricing_engine.price(input.lines, input.services)?;

        Ok(BuildEvaluation { offerable_parts, pricing })
    }
}
