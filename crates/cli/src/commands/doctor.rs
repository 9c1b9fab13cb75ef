use edara_core::config::{AppConfig, LoadOptions};
use edara_core::{ActionTokenSigner, TicketAction, TicketId};
use edara_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;

use crate::commands::runtime;

const APPROVAL_TABLES: [&str; 2] = ["ticket", "department_admin"];

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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped: {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let failed = checks.iter().filter(|check| check.status != CheckStatus::Pass).count();
        let (overall_status, summary) = if failed == 0 {
            (CheckStatus::Pass, format!("doctor: {} checks passed", checks.len()))
        } else {
            (CheckStatus::Fail, format!("doctor: {failed} of {} checks did not pass", checks.len()))
        };
        Self { overall_status, summary, checks }
    }

    fn to_human(&self) -> String {
        let mut lines = vec![self.summary.clone()];
        lines.extend(self.checks.iter().map(|check| {
            let marker = match check.status {
                CheckStatus::Pass => "ok",
                CheckStatus::Fail => "fail",
                CheckStatus::Skipped => "skip",
            };
            format!("- [{marker}] {}: {}", check.name, check.details)
        }));
        lines.join("\n")
    }
}

/// Readiness report; always exits zero so scripts can parse the JSON form.
pub fn run(json_output: bool) -> String {
    let report = DoctorReport::from_checks(collect_checks());

    if !json_output {
        return report.to_human();
    }
    serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
        serde_json::json!({
            "overall_status": "fail",
            "summary": "doctor report could not be serialized",
            "error": error.to_string(),
        })
        .to_string()
    })
}

fn collect_checks() -> Vec<DoctorCheck> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let reason = "configuration did not load";
            return vec![
                DoctorCheck::fail("config_validation", error.to_string()),
                DoctorCheck::skipped("signing_secret_readiness", reason),
                DoctorCheck::skipped("database_connectivity", reason),
                DoctorCheck::skipped("schema_migrations", reason),
            ];
        }
    };

    let mut checks = vec![
        DoctorCheck::pass("config_validation", "configuration loaded and validated"),
        check_signing_secret(&config),
    ];
    checks.extend(check_database(&config));
    checks
}

/// Signs and verifies a throwaway link to prove the configured key works.
fn check_signing_secret(config: &AppConfig) -> DoctorCheck {
    let signer = ActionTokenSigner::new(config.action_links.signing_secret.clone());
    let probe = TicketId("TKT-DOCTOR".to_string());
    let verified = signer
        .issue(&probe, TicketAction::Approve, "doctor", 0)
        .and_then(|token| signer.verify(&probe, TicketAction::Approve, &token));

    match verified {
        Ok(_) => DoctorCheck::pass("signing_secret_readiness", "approval links sign and verify"),
        Err(error) => DoctorCheck::fail("signing_secret_readiness", error.to_string()),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return vec![
                DoctorCheck::fail("database_connectivity", failure.output),
                DoctorCheck::skipped("schema_migrations", "async runtime unavailable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail("database_connectivity", format!("connect failed: {error}")),
                    DoctorCheck::skipped("schema_migrations", "database unreachable"),
                ];
            }
        };

        let checks = vec![
            DoctorCheck::pass(
                "database_connectivity",
                format!("connected to `{}`", config.database.url),
            ),
            check_schema(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let expected = APPROVAL_TABLES.len() as i64;
    match migrations::count_tables(pool, &APPROVAL_TABLES).await {
        Ok(found) if found == expected => {
            DoctorCheck::pass("schema_migrations", "approval tables present")
        }
        Ok(found) => DoctorCheck::fail(
            "schema_migrations",
            format!("{found}/{expected} approval tables present, run `edara migrate`"),
        ),
        Err(error) => {
            DoctorCheck::fail("schema_migrations", format!("schema probe failed: {error}"))
        }
    }
}
