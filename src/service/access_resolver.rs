//! 门禁判定
//!
//! 判定顺序：凭证是否可用 → 门是否在门禁组的门组中 → 当前时刻是否落在时间组的某个时间窗内。
//! 任何数据缺失都按拒绝处理：没有门禁组等同于空门组，时间组不存在等同于没有时间窗。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::infra::metrics;
use crate::model::credential::Credential;
use crate::model::group::{DoorGroup, SchedGroup};
use crate::repository::{CredentialRepository, DeviceRepository, GroupRepository};

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    DoorNotInGroup,
    OutsideSchedule,
    CredentialInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    fn metric_label(&self) -> &'static str {
        match self {
            AccessDecision::Granted => "granted",
            AccessDecision::Denied(DenyReason::DoorNotInGroup) => "door_not_in_group",
            AccessDecision::Denied(DenyReason::OutsideSchedule) => "outside_schedule",
            AccessDecision::Denied(DenyReason::CredentialInactive) => "credential_inactive",
        }
    }
}

/// 对外返回的判定结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCheck {
    pub credential_id: i64,
    pub door_id: Option<i64>,
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl AccessCheck {
    fn new(credential_id: i64, door_id: Option<i64>, decision: AccessDecision) -> Self {
        let reason = match decision {
            AccessDecision::Granted => None,
            AccessDecision::Denied(reason) => Some(reason),
        };
        Self {
            credential_id,
            door_id,
            granted: decision.is_granted(),
            reason,
        }
    }
}

/// 凭证当前生效的门组与时间组
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub doors: DoorGroup,
    pub schedule: SchedGroup,
}

/// 纯函数判定，不访问存储
pub fn evaluate(
    credential: &Credential,
    grant: Option<&AccessGrant>,
    door_id: i64,
    at: DateTime<Utc>,
) -> AccessDecision {
    if !credential.is_active_at(at.timestamp()) {
        return AccessDecision::Denied(DenyReason::CredentialInactive);
    }

    let Some(grant) = grant else {
        return AccessDecision::Denied(DenyReason::DoorNotInGroup);
    };

    if !grant.doors.door_ids.contains(&door_id) {
        return AccessDecision::Denied(DenyReason::DoorNotInGroup);
    }

    if !grant.schedule.allows(at) {
        return AccessDecision::Denied(DenyReason::OutsideSchedule);
    }

    AccessDecision::Granted
}

pub struct AccessResolver {
    credentials: Arc<CredentialRepository>,
    groups: Arc<GroupRepository>,
    devices: Arc<DeviceRepository>,
}

impl AccessResolver {
    pub fn new(
        credentials: Arc<CredentialRepository>,
        groups: Arc<GroupRepository>,
        devices: Arc<DeviceRepository>,
    ) -> Self {
        Self {
            credentials,
            groups,
            devices,
        }
    }

    /// 读取凭证当前的门禁组，门组或时间组缺失时以空集合代替
    async fn load_grant(&self, credential_id: i64) -> Result<Option<AccessGrant>> {
        let Some(access) = self.credentials.find_access(credential_id).await? else {
            return Ok(None);
        };
        let Some(group) = self.groups.find_access_group(access.access_group_id).await? else {
            return Ok(None);
        };

        let doors = self
            .groups
            .find_door_group(group.door_group_id)
            .await?
            .unwrap_or(DoorGroup {
                id: group.door_group_id,
                name: String::new(),
                door_ids: Vec::new(),
            });
        let schedule = self
            .groups
            .find_sched_group(group.sched_group_id)
            .await?
            .unwrap_or(SchedGroup {
                id: group.sched_group_id,
                name: String::new(),
                windows: Vec::new(),
            });

        Ok(Some(AccessGrant { doors, schedule }))
    }

    /// 判定凭证能否在 `at` 时刻打开门 `door_id`
    pub async fn check_access(
        &self,
        credential_id: i64,
        door_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AccessCheck> {
        let credential = self
            .credentials
            .find_by_id(credential_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("凭证 {} 不存在", credential_id)))?;

        let grant = self.load_grant(credential_id).await?;
        let decision = evaluate(&credential, grant.as_ref(), door_id, at);

        metrics::record_access_decision(decision.metric_label());
        debug!(credential_id, door_id, ?decision, "门禁判定");

        Ok(AccessCheck::new(credential_id, Some(door_id), decision))
    }

    /// 按硬件地址判定；未配置的地址不属于任何门组
    pub async fn check_access_at_address(
        &self,
        credential_id: i64,
        ib_addr: i64,
        output_addr: i64,
        at: DateTime<Utc>,
    ) -> Result<AccessCheck> {
        match self.devices.find_door_by_address(ib_addr, output_addr).await? {
            Some(door) => self.check_access(credential_id, door.id, at).await,
            None => {
                if self.credentials.find_by_id(credential_id).await?.is_none() {
                    return Err(ServerError::NotFound(format!("凭证 {} 不存在", credential_id)));
                }
                let decision = AccessDecision::Denied(DenyReason::DoorNotInGroup);
                metrics::record_access_decision(decision.metric_label());
                Ok(AccessCheck::new(credential_id, None, decision))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::credential::{CredentialStatus, CredentialType};
    use crate::model::group::SchedWindow;
    use chrono::TimeZone;

    fn credential() -> Credential {
        Credential {
            unique_id: 1,
            people_id: 1,
            credential_type: CredentialType::Card,
            card_no: Some("A1".to_string()),
            biometric: None,
            status: CredentialStatus::Active,
            valid_from: None,
            valid_until: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn office_hours(door_ids: Vec<i64>) -> AccessGrant {
        AccessGrant {
            doors: DoorGroup {
                id: 1,
                name: "lobby".to_string(),
                door_ids,
            },
            schedule: SchedGroup {
                id: 1,
                name: "weekdays".to_string(),
                windows: (0..5).map(|d| SchedWindow::new(d, 9 * 60, 18 * 60)).collect(),
            },
        }
    }

    // 2024-01-02 周二，2024-01-06 周六
    fn tuesday_10() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap()
    }

    fn saturday_10() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 6, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_weekday_schedule() {
        let grant = office_hours(vec![5]);
        assert_eq!(
            evaluate(&credential(), Some(&grant), 5, tuesday_10()),
            AccessDecision::Granted
        );
        assert_eq!(
            evaluate(&credential(), Some(&grant), 5, saturday_10()),
            AccessDecision::Denied(DenyReason::OutsideSchedule)
        );
    }

    #[test]
    fn test_empty_door_group_denies_every_door() {
        let grant = office_hours(vec![]);
        for door in [1, 2, 3, 100] {
            assert_eq!(
                evaluate(&credential(), Some(&grant), door, tuesday_10()),
                AccessDecision::Denied(DenyReason::DoorNotInGroup)
            );
        }
    }

    #[test]
    fn test_no_access_group_fails_closed() {
        assert_eq!(
            evaluate(&credential(), None, 1, tuesday_10()),
            AccessDecision::Denied(DenyReason::DoorNotInGroup)
        );
    }

    #[test]
    fn test_inactive_credential_checked_first() {
        let mut disabled = credential();
        disabled.status = CredentialStatus::Inactive;
        let grant = office_hours(vec![5]);
        assert_eq!(
            evaluate(&disabled, Some(&grant), 5, tuesday_10()),
            AccessDecision::Denied(DenyReason::CredentialInactive)
        );

        let mut expired = credential();
        expired.valid_until = Some(tuesday_10().timestamp() - 1);
        assert_eq!(
            evaluate(&expired, Some(&grant), 5, tuesday_10()),
            AccessDecision::Denied(DenyReason::CredentialInactive)
        );
    }

    #[test]
    fn test_empty_schedule_denies_all_times() {
        let mut grant = office_hours(vec![5]);
        grant.schedule.windows.clear();
        assert_eq!(
            evaluate(&credential(), Some(&grant), 5, tuesday_10()),
            AccessDecision::Denied(DenyReason::OutsideSchedule)
        );
    }
}
