use std::fs;

use rigquote_core::config::{AppConfig, LoadOptions};
use rigquote_core::cpq::catalog::{CatalogIndex, CatalogSnapshot};
use rigquote_core::domain::catalog::RuleMember;
use rigquote_core::errors::ApplicationError;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = exit_code(&report);

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

/// A failing config check exits like a config failure; failing catalog checks exit like an
/// unreadable input file.
fn exit_code(report: &DoctorReport) -> u8 {
    let failed = report.checks.iter().find(|check| check.status == CheckStatus::Fail);
    match failed.map(|check| check.name) {
        None => 0,
        Some("config_validation") => ApplicationError::Configuration(String::new()).exit_code(),
        Some(_) => ApplicationError::Input(String::new()).exit_code(),
    }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_catalog_snapshot(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["catalog_snapshot", "catalog_rules"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog_snapshot(config: &AppConfig) -> Vec<DoctorCheck> {
    let path = &config.catalog.path;
    let snapshot = fs::read_to_string(path)
        .map_err(|error| format!("could not read `{}`: {error}", path.display()))
        .and_then(|raw| {
            CatalogSnapshot::from_json(&raw)
                .map_err(|error| format!("could not decode `{}`: {error}", path.display()))
        });

    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(details) => {
            return vec![
                DoctorCheck { name: "catalog_snapshot", status: CheckStatus::Fail, details },
                DoctorCheck {
                    name: "catalog_rules",
                    status: CheckStatus::Skipped,
                    details: "skipped because the catalog snapshot did not load".to_string(),
                },
            ];
        }
    };

    let index = CatalogIndex::from_snapshot(snapshot);
    let snapshot_check = DoctorCheck {
        name: "catalog_snapshot",
        status: CheckStatus::Pass,
        details: format!(
            "{} parts ({} active), {} services ({} active) from `{}`",
            index.parts().len(),
            index.active_parts().len(),
            index.services().len(),
            index.active_services().len(),
            path.display()
        ),
    };

    vec![snapshot_check, check_rule_references(&index)]
}

/// Flags active rules whose part members name ids missing from the snapshot.
fn check_rule_references(index: &CatalogIndex) -> DoctorCheck {
    let dangling: Vec<String> = index
        .active_rules()
        .into_iter()
        .flat_map(|rule| {
            rule.members.iter().filter_map(move |member| match member {
                RuleMember::Part(id) if index.find_part(id).is_err() => {
                    Some(format!("{} -> {}", rule.id.0, id.0))
                }
                _ => None,
            })
        })
        .collect();

    if dangling.is_empty() {
        DoctorCheck {
            name: "catalog_rules",
            status: CheckStatus::Pass,
            details: format!("{} active combination rules resolve", index.active_rules().len()),
        }
    } else {
        DoctorCheck {
            name: "catalog_rules",
            status: CheckStatus::Fail,
            details: format!("rules reference unknown parts: {}", dangling.join(", ")),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
