use std::path::Path;

use rigquote_core::cpq::pricing::{DeterministicPricingEngine, PricingEngine};
use rigquote_core::domain::line::{LineItem, ServiceLine};
use rigquote_core::errors::ApplicationError;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::commands::{load_config, read_json, CommandResult};

const COMMAND: &str = "price";

/// Lines of an estimate draft as exported by the counter UI.
#[derive(Debug, Deserialize)]
struct PriceRequest {
    #[serde(default)]
    lines: Vec<LineItem>,
    #[serde(default)]
    services: Vec<ServiceLine>,
}

pub fn run(estimate_path: &Path) -> CommandResult {
    match evaluate(estimate_path) {
        Ok(result) => result,
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

fn evaluate(estimate_path: &Path) -> Result<CommandResult, ApplicationError> {
    let config = load_config()?;
    let request: PriceRequest = read_json(estimate_path)?;

    let result = DeterministicPricingEngine.price(&request.lines, &request.services)?;
    let totals = result.totals.rounded(config.pricing.rounding_scale);

    info!(
        event_name = "pricing.computed",
        line_count = request.lines.len(),
        service_count = request.services.len(),
        total = %totals.total,
        "priced estimate draft"
    );

    Ok(CommandResult::success_with_data(
        COMMAND,
        format!("total {}", totals.total),
        Some(json!({
            "rounding_scale": config.pricing.rounding_scale,
            "totals": totals,
            "trace": result.trace,
        })),
    ))
}
