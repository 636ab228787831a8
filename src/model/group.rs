//! 门组、时间组与门禁组（other_group 库），以及门（config 库）

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// 门：接口板上的一个输出口，`id` 即门地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Door {
    pub id: i64,
    pub interface_board_id: i64,
    pub ib_addr: i64,
    pub output_addr: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDoor {
    pub interface_board_id: i64,
    pub output_addr: i64,
    #[serde(default)]
    pub name: String,
}

/// 门组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorGroup {
    pub id: i64,
    pub name: String,
    pub door_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDoorGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub door_ids: Vec<i64>,
}

/// 时间窗：`weekday` 0=周一 .. 6=周日，分钟区间 `[start_minute, end_minute)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SchedWindow {
    pub weekday: i64,
    pub start_minute: i64,
    pub end_minute: i64,
}

impl SchedWindow {
    pub fn new(weekday: i64, start_minute: i64, end_minute: i64) -> Self {
        Self {
            weekday,
            start_minute,
            end_minute,
        }
    }

    pub fn is_valid(&self) -> bool {
        (0..=6).contains(&self.weekday)
            && (0..=1440).contains(&self.start_minute)
            && (0..=1440).contains(&self.end_minute)
            && self.start_minute < self.end_minute
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let weekday = at.weekday().num_days_from_monday() as i64;
        let minute = (at.hour() * 60 + at.minute()) as i64;
        weekday == self.weekday && self.start_minute <= minute && minute < self.end_minute
    }
}

/// 时间组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedGroup {
    pub id: i64,
    pub name: String,
    pub windows: Vec<SchedWindow>,
}

impl SchedGroup {
    /// 没有任何时间窗时拒绝所有时刻
    pub fn allows(&self, at: DateTime<Utc>) -> bool {
        self.windows.iter().any(|w| w.contains(at))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub windows: Vec<SchedWindow>,
}

/// 门禁组：门组 + 时间组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessGroup {
    pub id: i64,
    pub name: String,
    pub door_group_id: i64,
    pub sched_group_id: i64,
    /// 非空表示该组专属于某个凭证
    pub owner_credential_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccessGroup {
    #[serde(default)]
    pub name: String,
    pub door_group_id: i64,
    pub sched_group_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignAccessGroup {
    pub access_group_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_is_half_open() {
        // 2024-01-02 是周二
        let window = SchedWindow::new(1, 9 * 60, 18 * 60);
        let at = |h, m| Utc.with_ymd_and_hms(2024, 1, 2, h, m, 0).unwrap();

        assert!(!window.contains(at(8, 59)));
        assert!(window.contains(at(9, 0)));
        assert!(window.contains(at(17, 59)));
        assert!(!window.contains(at(18, 0)));
    }

    #[test]
    fn test_empty_sched_group_allows_nothing() {
        let group = SchedGroup {
            id: 1,
            name: String::new(),
            windows: vec![],
        };
        assert!(!group.allows(Utc::now()));
    }

    #[test]
    fn test_window_validation() {
        assert!(SchedWindow::new(6, 0, 1440).is_valid());
        assert!(!SchedWindow::new(7, 0, 60).is_valid());
        assert!(!SchedWindow::new(0, 600, 600).is_valid());
    }
}
