//! Overdue check-out reminders.
//!
//! Shift windows are wall-clock times in the company's local zone (KSA,
//! UTC+03:00 unless configured otherwise). Overnight windows end on the day
//! after they start, and a check-in taken after midnight but before the end
//! time belongs to the previous evening's shift.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shift::{ShiftAttendance, ShiftWindow};

pub const KSA_UTC_OFFSET_MINUTES: i32 = 180;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueReminder {
    pub attendance_id: String,
    pub user_id: String,
    pub shift_end: DateTime<Utc>,
    pub overdue_minutes: i64,
}

impl ShiftWindow {
    /// Local date the shift started on, given a local check-in moment.
    pub fn shift_date_for(&self, checked_in_local: NaiveDateTime) -> NaiveDate {
        let date = checked_in_local.date();
        if self.is_overnight() && checked_in_local.time() < self.end {
            return date.pred_opt().unwrap_or(date);
        }
        date
    }

    /// Local end of the shift that started on `shift_date`.
    pub fn end_for(&self, shift_date: NaiveDate) -> NaiveDateTime {
        let end_date = if self.is_overnight() {
            shift_date.succ_opt().unwrap_or(shift_date)
        } else {
            shift_date
        };
        end_date.and_time(self.end)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OverdueCheck {
    offset: FixedOffset,
    grace: Duration,
}

impl Default for OverdueCheck {
    fn default() -> Self {
        Self::new(KSA_UTC_OFFSET_MINUTES, 15)
    }
}

impl OverdueCheck {
    /// Out-of-range offsets fall back to KSA time.
    pub fn new(utc_offset_minutes: i32, grace_minutes: u32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .or_else(|| FixedOffset::east_opt(KSA_UTC_OFFSET_MINUTES * 60))
            .unwrap_or_else(|| Utc.fix());
        Self { offset, grace: Duration::minutes(i64::from(grace_minutes)) }
    }

    pub fn shift_end(&self, attendance: &ShiftAttendance) -> Option<DateTime<Utc>> {
        let checked_in_local = attendance.checked_in_at.with_timezone(&self.offset).naive_local();
        let shift_date = attendance.window.shift_date_for(checked_in_local);
        let local_end = attendance.window.end_for(shift_date);
        local_end
            .and_local_timezone(self.offset)
            .single()
            .map(|end| end.with_timezone(&Utc))
    }

    pub fn evaluate(
        &self,
        attendance: &ShiftAttendance,
        now: DateTime<Utc>,
    ) -> Option<OverdueReminder> {
        if !attendance.is_open() {
            return None;
        }
        let shift_end = self.shift_end(attendance)?;
        if now <= shift_end + self.grace {
            return None;
        }
        Some(OverdueReminder {
            attendance_id: attendance.id.clone(),
            user_id: attendance.user_id.clone(),
            shift_end,
            overdue_minutes: (now - shift_end).num_minutes(),
        })
    }

    pub fn overdue<'a, I>(&self, attendances: I, now: DateTime<Utc>) -> Vec<OverdueReminder>
    where
        I: IntoIterator<Item = &'a ShiftAttendance>,
    {
        attendances.into_iter().filter_map(|attendance| self.evaluate(attendance, now)).collect()
    }
}
