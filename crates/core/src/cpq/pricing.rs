use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::estimate::EstimateTotals;
use crate::domain::line::{LineItem, ServiceLine};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub totals: EstimateTotals,
    pub trace: Vec<PricingTraceStep>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub line_total: Decimal,
    pub line_tax: Decimal,
}

pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        lines: &[LineItem],
        services: &[ServiceLine],
    ) -> Result<PricingResult, DomainError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn price(
        &self,
        lines: &[LineItem],
        services: &[ServiceLine],
    ) -> Result<PricingResult, DomainError> {
        price_lines_with_trace(lines, services)
    }
}

impl<P> PricingEngine for &P
where
    P: PricingEngine + ?Sized,
{
    fn price(
        &self,
        lines: &[LineItem],
        services: &[ServiceLine],
    ) -> Result<PricingResult, DomainError> {
        (**self).price(lines, services)
    }
}

/// `unit_price * qty * (1 - discount/100)`, taxed at `tax_rate/100` of that total.
pub fn part_line_amounts(line: &LineItem) -> Result<LineAmounts, DomainError> {
    check_quantity(line.quantity, &line.sku)?;
    check_non_negative("unit_price", &line.sku, line.unit_price)?;
    check_non_negative("tax_rate_pct", &line.sku, line.tax_rate_pct)?;
    check_non_negative("discount_pct", &line.sku, line.discount_pct)?;
    if line.discount_pct > Decimal::ONE_HUNDRED {
        return Err(out_of_range("discount_pct", &line.sku, line.discount_pct));
    }

    let gross = line
        .unit_price
        .checked_mul(Decimal::from(line.quantity))
        .ok_or_else(|| out_of_range("unit_price", &line.sku, line.unit_price))?;
    let line_total = gross
        .checked_mul(Decimal::ONE - line.discount_pct / Decimal::ONE_HUNDRED)
        .ok_or_else(|| out_of_range("unit_price", &line.sku, line.unit_price))?;
    let line_tax = (line.tax_rate_pct / Decimal::ONE_HUNDRED)
        .checked_mul(line_total)
        .ok_or_else(|| out_of_range("tax_rate_pct", &line.sku, line.tax_rate_pct))?;
    Ok(LineAmounts { line_total, line_tax })
}

pub fn service_line_amounts(line: &ServiceLine) -> Result<LineAmounts, DomainError> {
    check_quantity(line.quantity, &line.name)?;
    check_non_negative("unit_price", &line.name, line.unit_price)?;
    check_non_negative("tax_rate_pct", &line.name, line.tax_rate_pct)?;

    let line_total = line
        .unit_price
        .checked_mul(Decimal::from(line.quantity))
        .ok_or_else(|| out_of_range("unit_price", &line.name, line.unit_price))?;
    let line_tax = (line.tax_rate_pct / Decimal::ONE_HUNDRED)
        .checked_mul(line_total)
        .ok_or_else(|| out_of_range("tax_rate_pct", &line.name, line.tax_rate_pct))?;
    Ok(LineAmounts { line_total, line_tax })
}

pub fn price_lines(
    lines: &[LineItem],
    services: &[ServiceLine],
) -> Result<EstimateTotals, DomainError> {
    let mut totals = EstimateTotals::default();

    for line in lines {
        let amounts = part_line_amounts(line)?;
        totals.parts_subtotal = sum("parts_subtotal", totals.parts_subtotal, amounts.line_total)?;
        totals.parts_tax = sum("parts_tax", totals.parts_tax, amounts.line_tax)?;
    }
    for line in services {
        let amounts = service_line_amounts(line)?;
        totals.services_subtotal =
            sum("services_subtotal", totals.services_subtotal, amounts.line_total)?;
        totals.services_tax = sum("services_tax", totals.services_tax, amounts.line_tax)?;
    }

    totals.subtotal = sum("subtotal", totals.parts_subtotal, totals.services_subtotal)?;
    totals.tax = sum("tax", totals.parts_tax, totals.services_tax)?;
    totals.total = sum("total", totals.subtotal, totals.tax)?;
    Ok(totals)
}

pub fn price_lines_with_trace(
    lines: &[LineItem],
    services: &[ServiceLine],
) -> Result<PricingResult, DomainError> {
    let totals = price_lines(lines, services)?;
    let step = |stage: &str, detail: &str, amount: Decimal| PricingTraceStep {
        stage: stage.to_string(),
        detail: detail.to_string(),
        amount,
    };

    Ok(PricingResult {
        totals,
        trace: vec![
            step(
                "parts_subtotal",
                "sum(unit_price * quantity * (1 - discount_pct / 100))",
                totals.parts_subtotal,
            ),
            step("parts_tax", "sum(tax_rate_pct / 100 * line_total)", totals.parts_tax),
            step("services_subtotal", "sum(unit_price * quantity)", totals.services_subtotal),
            step("services_tax", "sum(tax_rate_pct / 100 * line_total)", totals.services_tax),
            step("subtotal", "parts_subtotal + services_subtotal", totals.subtotal),
            step("tax", "parts_tax + services_tax", totals.tax),
            step("total", "subtotal + tax", totals.total),
        ],
    })
}

fn check_quantity(quantity: u32, label: &str) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::Validation(format!("line `{label}` must have quantity >= 1")));
    }
    Ok(())
}

fn check_non_negative(field: &str, label: &str, value: Decimal) -> Result<(), DomainError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(out_of_range(field, label, value));
    }
    Ok(())
}

fn out_of_range(field: &str, label: &str, value: Decimal) -> DomainError {
    DomainError::InputRange { field: format!("{field} of line `{label}`"), value }
}

/// Adds to a running total, refusing sums past the `Decimal` range.
fn sum(field: &str, running: Decimal, amount: Decimal) -> Result<Decimal, DomainError> {
    let overflow = || DomainError::InputRange { field: format!("estimate {field}"), value: amount };
    running.checked_add(amount).ok_or_else(overflow)
}
