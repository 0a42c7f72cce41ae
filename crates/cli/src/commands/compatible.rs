use std::path::PathBuf;

use rigquote_core::cpq::compat::{resolve_compatibility, CompatibilityQuery};
use rigquote_core::domain::catalog::PartId;
use rigquote_core::errors::ApplicationError;
use serde_json::json;
use tracing::info;

use crate::commands::{load_catalog, load_config, CommandResult};

const COMMAND: &str = "compatible";

pub fn run(catalog: Option<PathBuf>, select: Vec<String>, all: bool) -> CommandResult {
    match evaluate(catalog, select, all) {
        Ok(result) => result,
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

fn evaluate(
    catalog: Option<PathBuf>,
    select: Vec<String>,
    all: bool,
) -> Result<CommandResult, ApplicationError> {
    let catalog_path = match catalog {
        Some(path) => path,
        None => load_config()?.catalog.path,
    };
    let index = load_catalog(&catalog_path)?;

    let mut query = CompatibilityQuery::new(
        select.into_iter().map(|id| id.trim().to_string()).filter(|id| !id.is_empty()).map(PartId),
    );
    if all {
        query = query.show_all();
    }

    let report = resolve_compatibility(&index, &query);
    info!(
        event_name = "compatibility.resolved",
        selected = query.selected.len(),
        offered = report.parts.len(),
        pass_through = report.pass_through,
        "resolved compatible parts"
    );

    let parts: Vec<_> = report
        .parts
        .iter()
        .map(|part| {
            json!({
                "id": part.id.0,
                "name": part.name,
                "sku": part.sku,
                "category": part.category,
                "unit_price": part.unit_price,
                "stock_quantity": part.stock_quantity,
            })
        })
        .collect();
    let triggered_rules: Vec<&str> =
        report.triggered_rules.iter().map(|rule| rule.0.as_str()).collect();

    Ok(CommandResult::success_with_data(
        COMMAND,
        format!("{} compatible parts", report.parts.len()),
        Some(json!({
            "pass_through": report.pass_through,
            "triggered_rules": triggered_rules,
            "parts": parts,
        })),
    ))
}
