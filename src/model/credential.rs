use serde::{Deserialize, Serialize};

/// 凭证类型：0=卡, 1=生物特征
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CredentialType {
    Card,
    Biometric,
}

impl TryFrom<i64> for CredentialType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CredentialType::Card),
            1 => Ok(CredentialType::Biometric),
            other => Err(format!("unknown credential type: {}", other)),
        }
    }
}

impl From<CredentialType> for i64 {
    fn from(value: CredentialType) -> Self {
        match value {
            CredentialType::Card => 0,
            CredentialType::Biometric => 1,
        }
    }
}

/// 凭证状态：1=有效, 0=停用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CredentialStatus {
    Inactive,
    Active,
}

impl TryFrom<i64> for CredentialStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CredentialStatus::Inactive),
            1 => Ok(CredentialStatus::Active),
            other => Err(format!("unknown credential status: {}", other)),
        }
    }
}

impl From<CredentialStatus> for i64 {
    fn from(value: CredentialStatus) -> Self {
        match value {
            CredentialStatus::Inactive => 0,
            CredentialStatus::Active => 1,
        }
    }
}

/// 凭证
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub unique_id: i64,
    pub people_id: i64,
    pub credential_type: CredentialType,
    pub card_no: Option<String>,
    pub biometric: Option<String>,
    pub status: CredentialStatus,
    /// 生效时间（Unix 秒，含）
    pub valid_from: Option<i64>,
    /// 失效时间（Unix 秒，含）
    pub valid_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Credential {
    /// 在 `at` 时刻是否处于可用状态
    pub fn is_active_at(&self, at: i64) -> bool {
        if self.status != CredentialStatus::Active {
            return false;
        }
        if matches!(self.valid_from, Some(from) if at < from) {
            return false;
        }
        !matches!(self.valid_until, Some(until) if at > until)
    }
}

/// 创建凭证请求，省略的可选字段取默认值
#[derive(Debug, Clone, Deserialize)]
pub struct NewCredential {
    pub people_id: i64,
    pub credential_type: Option<CredentialType>,
    pub card_no: Option<String>,
    pub biometric: Option<String>,
    pub status: Option<CredentialStatus>,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
}

impl NewCredential {
    pub fn card(people_id: i64, card_no: impl Into<String>) -> Self {
        Self {
            people_id,
            credential_type: Some(CredentialType::Card),
            card_no: Some(card_no.into()),
            biometric: None,
            status: None,
            valid_from: None,
            valid_until: None,
        }
    }
}

/// 凭证的稀疏更新：只有 `Some` 字段会覆盖原值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialPatch {
    pub people_id: Option<i64>,
    pub credential_type: Option<CredentialType>,
    pub card_no: Option<String>,
    pub biometric: Option<String>,
    pub status: Option<CredentialStatus>,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
}

impl CredentialPatch {
    pub fn is_empty(&self) -> bool {
        self.people_id.is_none()
            && self.credential_type.is_none()
            && self.card_no.is_none()
            && self.biometric.is_none()
            && self.status.is_none()
            && self.valid_from.is_none()
            && self.valid_until.is_none()
    }

    pub fn apply(&self, credential: &mut Credential) {
        if let Some(v) = self.people_id {
            credential.people_id = v;
        }
        if let Some(v) = self.credential_type {
            credential.credential_type = v;
        }
        if let Some(v) = &self.card_no {
            credential.card_no = Some(v.clone());
        }
        if let Some(v) = &self.biometric {
            credential.biometric = Some(v.clone());
        }
        if let Some(v) = self.status {
            credential.status = v;
        }
        if let Some(v) = self.valid_from {
            credential.valid_from = Some(v);
        }
        if let Some(v) = self.valid_until {
            credential.valid_until = Some(v);
        }
    }
}

/// 凭证与门禁组的关联（每个凭证至多一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CredentialAccess {
    pub credential_id: i64,
    pub access_group_id: i64,
    pub updated_at: i64,
}

/// 替换凭证可通行的门与时间组
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorAccessUpdate {
    #[serde(alias = "door_ids")]
    pub door_ids: Vec<i64>,
    #[serde(alias = "sched_group_id")]
    pub sched_group_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credential {
        Credential {
            unique_id: 7,
            people_id: 1,
            credential_type: CredentialType::Card,
            card_no: Some("0001".to_string()),
            biometric: None,
            status: CredentialStatus::Active,
            valid_from: Some(100),
            valid_until: Some(200),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_patch_only_touches_provided_fields() {
        let mut credential = sample();
        let patch = CredentialPatch {
            card_no: Some("0002".to_string()),
            ..Default::default()
        };
        patch.apply(&mut credential);

        assert_eq!(credential.card_no.as_deref(), Some("0002"));
        assert_eq!(credential.valid_from, Some(100));
        assert_eq!(credential.status, CredentialStatus::Active);
        assert!(!patch.is_empty());
        assert!(CredentialPatch::default().is_empty());
    }

    #[test]
    fn test_validity_window_is_inclusive() {
        let credential = sample();
        assert!(!credential.is_active_at(99));
        assert!(credential.is_active_at(100));
        assert!(credential.is_active_at(200));
        assert!(!credential.is_active_at(201));

        let mut disabled = sample();
        disabled.status = CredentialStatus::Inactive;
        assert!(!disabled.is_active_at(150));
    }

    #[test]
    fn test_door_access_update_accepts_both_casings() {
        let camel: DoorAccessUpdate =
            serde_json::from_str(r#"{"doorIds":[1,2],"schedGroupId":3}"#).unwrap();
        let snake: DoorAccessUpdate =
            serde_json::from_str(r#"{"door_ids":[1,2],"sched_group_id":3}"#).unwrap();
        assert_eq!(camel.door_ids, snake.door_ids);
        assert_eq!(camel.sched_group_id, 3);
    }
}
