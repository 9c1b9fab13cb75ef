use chrono::{DateTime, Utc};
use edara_core::config::{AppConfig, LoadOptions};
use edara_core::OverdueCheck;
use edara_db::connect_with_config;
use edara_db::repositories::{ShiftAttendanceRepository, SqlShiftAttendanceRepository};
use serde_json::json;

use crate::commands::{runtime, CommandResult};

pub fn run(now: Option<&str>) -> CommandResult {
    let now = match now.map(parse_now).transpose() {
        Ok(now) => now.unwrap_or_else(Utc::now),
        Err(message) => {
            return CommandResult::failure("overdue-shifts", "invalid_argument", message, 6);
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "overdue-shifts",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime("overdue-shifts") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let open = SqlShiftAttendanceRepository::new(pool.clone())
            .list_open()
            .await
            .map_err(|error| ("persistence", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(open)
    });

    let open = match result {
        Ok(open) => open,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("overdue-shifts", error_class, message, exit_code);
        }
    };

    let check =
        OverdueCheck::new(config.shifts.utc_offset_minutes, config.shifts.overdue_grace_minutes);
    let reminders = check.overdue(&open, now);
    let rendered: Vec<_> = reminders
        .iter()
        .map(|reminder| {
            json!({
                "attendance_id": reminder.attendance_id,
                "user_id": reminder.user_id,
                "shift_end": reminder.shift_end.to_rfc3339(),
                "overdue_minutes": reminder.overdue_minutes,
            })
        })
        .collect();

    CommandResult::success_with_data(
        "overdue-shifts",
        format!("{} of {} open attendance(s) overdue for checkout", reminders.len(), open.len()),
        json!({ "checked_at": now.to_rfc3339(), "reminders": rendered }),
    )
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| format!("`--now` must be an RFC3339 timestamp: {error}"))
}
