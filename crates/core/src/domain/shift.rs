use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduled working hours in local wall-clock time.
///
/// A window whose end is not after its start wraps past midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ShiftWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_overnight(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftAttendance {
    pub id: String,
    pub user_id: String,
    pub window: ShiftWindow,
    pub checked_in_at: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
}

impl ShiftAttendance {
    pub fn is_open(&self) -> bool {
        self.checked_out_at.is_none()
    }
}
