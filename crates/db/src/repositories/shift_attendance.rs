use chrono::NaiveTime;
use sqlx::Row;

use edara_core::domain::shift::{ShiftAttendance, ShiftWindow};

use super::{decode_err, parse_timestamp, RepositoryError, ShiftAttendanceRepository};
use crate::DbPool;

const TIME_FORMAT: &str = "%H:%M:%S";

pub struct SqlShiftAttendanceRepository {
    pool: DbPool,
}

impl SqlShiftAttendanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_time(column: &str, value: &str) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

fn row_to_attendance(row: &sqlx::sqlite::SqliteRow) -> Result<ShiftAttendance, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let user_id: String = row.try_get("user_id").map_err(decode_err)?;
    let shift_start: String = row.try_get("shift_start").map_err(decode_err)?;
    let shift_end: String = row.try_get("shift_end").map_err(decode_err)?;
    let checked_in_at: String = row.try_get("checked_in_at").map_err(decode_err)?;
    let checked_out_at: Option<String> = row.try_get("checked_out_at").map_err(decode_err)?;

    Ok(ShiftAttendance {
        id,
        user_id,
        window: ShiftWindow::new(
            parse_time("shift_start", &shift_start)?,
            parse_time("shift_end", &shift_end)?,
        ),
        checked_in_at: parse_timestamp("checked_in_at", &checked_in_at)?,
        checked_out_at: checked_out_at
            .map(|value| parse_timestamp("checked_out_at", &value))
            .transpose()?,
    })
}

#[async_trait::async_trait]
impl ShiftAttendanceRepository for SqlShiftAttendanceRepository {
    async fn list_open(&self) -> Result<Vec<ShiftAttendance>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, user_id, shift_start, shift_end, checked_in_at, checked_out_at
             FROM shift_attendance
             WHERE checked_out_at IS NULL
             ORDER BY checked_in_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_attendance).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, attendance: ShiftAttendance) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shift_attendance (id, user_id, shift_start, shift_end, checked_in_at,
                                           checked_out_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 shift_start = excluded.shift_start,
                 shift_end = excluded.shift_end,
                 checked_out_at = excluded.checked_out_at",
        )
        .bind(&attendance.id)
        .bind(&attendance.user_id)
        .bind(attendance.window.start.format(TIME_FORMAT).to_string())
        .bind(attendance.window.end.format(TIME_FORMAT).to_string())
        .bind(attendance.checked_in_at.to_rfc3339())
        .bind(attendance.checked_out_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
