use serde::{Deserialize, Serialize};

/// 部门
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDepartment {
    pub name: String,
}

/// 人员
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct People {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// 工号
    pub code: String,
    pub department_id: Option<i64>,
    pub card_no: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPeople {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub code: String,
    pub department_id: Option<i64>,
    pub card_no: Option<String>,
}

/// 人员的稀疏更新：`None` 表示保持原值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeoplePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub code: Option<String>,
    pub department_id: Option<i64>,
    pub card_no: Option<String>,
}

impl PeoplePatch {
    pub fn apply(&self, people: &mut People) {
        if let Some(v) = &self.first_name {
            people.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            people.last_name = v.clone();
        }
        if let Some(v) = &self.code {
            people.code = v.clone();
        }
        if let Some(v) = self.department_id {
            people.department_id = Some(v);
        }
        if let Some(v) = &self.card_no {
            people.card_no = Some(v.clone());
        }
    }
}
