use std::time::Instant;

use chrono::Utc;
use rigquote_core::audit::{AuditContext, InMemoryAuditSink};
use rigquote_core::config::{AppConfig, LoadOptions};
use rigquote_core::cpq::catalog::CatalogIndex;
use rigquote_core::cpq::compat::{compatible_parts, CompatibilityQuery};
use rigquote_core::domain::catalog::{
    CombinationRule, Part, PartId, RuleId, RuleKind, RuleMember, Service, ServiceId,
};
use rigquote_core::domain::estimate::{Customer, EstimateId, EstimatePatch, EstimateStatus};
use rigquote_core::domain::line::{LineItem, ServiceLine};
use rigquote_core::library::ModelLibrary;
use rigquote_core::lifecycle::{
    EstimateLifecycle, EstimatePolicy, EstimateService, InMemoryEstimateRepository,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

type SmokeService = EstimateService<InMemoryEstimateRepository, InMemoryAuditSink>;

const DOWNSTREAM_CHECKS: [&str; 3] = ["compatibility", "estimate_lifecycle", "model_library"];

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.extend(DOWNSTREAM_CHECKS.into_iter().map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let catalog = fixture_catalog();
    checks.push(record("compatibility", timed_check(|| check_compatibility(&catalog))));

    let service = EstimateService::new(
        InMemoryEstimateRepository::default(),
        EstimateLifecycle::default(),
        InMemoryAuditSink::default(),
        EstimatePolicy::from(&config.estimates),
    );
    let context = AuditContext::new(format!("smoke-{}", Utc::now().timestamp_millis()), "smoke");

    let lifecycle = timed_check(|| check_lifecycle(&service, &catalog, &context));
    let estimate_id = lifecycle.as_ref().ok().map(|(_, (id, _))| id.clone());
    checks.push(record("estimate_lifecycle", lifecycle.map(|(ms, (_, message))| (ms, message))));

    match estimate_id {
        Some(id) => {
            checks.push(record(
                "model_library",
                timed_check(|| check_model_library(&service, &id, &context)),
            ));
        }
        None => checks.push(skipped("model_library")),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn check_compatibility(catalog: &CatalogIndex) -> Result<String, String> {
    let selection = CompatibilityQuery::new([PartId("cpu-am5".to_string())]);
    let offered: Vec<String> =
        compatible_parts(catalog, &selection).into_iter().map(|part| part.id.0).collect();
    if offered.iter().any(|id| id == "mb-am4") {
        return Err(format!("AM4 board offered alongside an AM5 processor: {offered:?}"));
    }

    let everything = compatible_parts(catalog, &selection.clone().show_all());
    if everything.len() != catalog.active_parts().len() {
        return Err("show-all did not return the whole active catalog".to_string());
    }

    Ok(format!("{} of {} active parts offered for cpu-am5", offered.len(), everything.len()))
}

fn check_lifecycle(
    service: &SmokeService,
    catalog: &CatalogIndex,
    context: &AuditContext,
) -> Result<(EstimateId, String), String> {
    let cpu = catalog.find_part(&PartId("cpu-am5".to_string())).map_err(|e| e.to_string())?;
    let assembly = catalog
        .find_service(&ServiceId("svc-assembly".to_string()))
        .map_err(|e| e.to_string())?;

    let customer = Customer {
        name: "Smoke Check".to_string(),
        mobile: "9000000000".to_string(),
        email: None,
        address: None,
    };
    let draft = service.draft(customer, Utc::now().date_naive());
    let estimate = service
        .create(
            draft,
            vec![LineItem::from_part(cpu, 2)],
            vec![ServiceLine::from_service(assembly, 1)],
            context,
        )
        .map_err(|e| e.to_string())?;
    let id = estimate.id().clone();

    let discounted: Vec<LineItem> = estimate
        .lines()
        .iter()
        .cloned()
        .map(|line| line.with_discount(Decimal::new(10, 0)))
        .collect();
    let updated = service
        .update(
            &id,
            EstimatePatch { lines: Some(discounted), ..EstimatePatch::default() },
            "Counter discount",
            context,
        )
        .map_err(|e| e.to_string())?;
    if updated.totals().total != Decimal::new(2714, 0) {
        return Err(format!("expected total 2714 after discount, got {}", updated.totals().total));
    }

    service.transition(&id, EstimateStatus::Sent, context).map_err(|e| e.to_string())?;
    service.transition(&id, EstimateStatus::Accepted, context).map_err(|e| e.to_string())?;
    let (order, converted) = service.convert_to_order(&id, context).map_err(|e| e.to_string())?;

    if converted.status() != EstimateStatus::Converted || order.estimate_version != 5 {
        return Err(format!(
            "unexpected conversion result: status {:?}, version {}",
            converted.status(),
            order.estimate_version
        ));
    }

    Ok((
        id,
        format!(
            "estimate converted at version {} with total {}",
            converted.version(),
            order.totals.total
        ),
    ))
}

fn check_model_library(
    service: &SmokeService,
    id: &EstimateId,
    context: &AuditContext,
) -> Result<String, String> {
    let mut library = ModelLibrary::new();
    let model = service
        .save_as_model(id, "Smoke AM5 build", &mut library, context)
        .map_err(|e| e.to_string())?;
    let source = service.get(id).map_err(|e| e.to_string())?;
    let loaded = library.load(&model.id).map_err(|e| e.to_string())?;

    let same_content = loaded.len() == source.lines().len()
        && loaded.iter().zip(source.lines()).all(|(copy, original)| {
            copy.same_content(original) && copy.id != original.id
        });
    if !same_content {
        return Err("loaded model lines differ from the saved estimate".to_string());
    }

    Ok(format!("model `{}` round-tripped {} lines", model.name, loaded.len()))
}

fn fixture_catalog() -> CatalogIndex {
    let part = |id: &str, category: &str, price: i64| Part {
        id: PartId(id.to_string()),
        name: id.to_string(),
        sku: id.to_ascii_uppercase(),
        category: category.to_string(),
        unit_price: Decimal::new(price, 0),
        mrp: Decimal::new(price, 0),
        tax_rate_pct: Decimal::new(18, 0),
        stock_quantity: 3,
        active: true,
        model_number: None,
    };
    let pairing = |id: &str, members: [&str; 2]| CombinationRule {
        id: RuleId(id.to_string()),
        name: format!("{id} pairing"),
        active: true,
        kind: RuleKind::Include,
        members: members
            .into_iter()
            .map(|member| RuleMember::Part(PartId(member.to_string())))
            .collect(),
    };

    CatalogIndex::new(
        vec![
            part("cpu-am5", "CPU", 1000),
            part("mb-am5", "Motherboard", 1500),
            part("mb-am4", "Motherboard", 900),
            part("case-mid", "Cabinet", 400),
        ],
        vec![Service {
            id: ServiceId("svc-assembly".to_string()),
            name: "Assembly".to_string(),
            unit: "job".to_string(),
            unit_price: Decimal::new(500, 0),
            tax_rate_pct: Decimal::new(18, 0),
            active: true,
            description: None,
        }],
    )
    .with_rules(vec![pairing("am5", ["cpu-am5", "mb-am5"]), pairing("am4", ["cpu-am4", "mb-am4"])])
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn record(name: &'static str, outcome: Result<(u64, String), (u64, String)>) -> SmokeCheck {
    match outcome {
        Ok((elapsed_ms, message)) => {
            SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message }
        }
        Err((elapsed_ms, message)) => {
            SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message }
        }
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
