use serde::{Deserialize, Serialize};

/// 控制器用户类型
///
/// JSON 与数据库中均以整数表示：0=内部, 1=工厂, 2=管理员, 3=普通用户
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum UserType {
    Internal,
    Factory,
    Manager,
    OwnsaUser,
}

impl UserType {
    pub fn as_i64(self) -> i64 {
        match self {
            UserType::Internal => 0,
            UserType::Factory => 1,
            UserType::Manager => 2,
            UserType::OwnsaUser => 3,
        }
    }
}

impl TryFrom<i64> for UserType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UserType::Internal),
            1 => Ok(UserType::Factory),
            2 => Ok(UserType::Manager),
            3 => Ok(UserType::OwnsaUser),
            other => Err(format!("unknown user type: {}", other)),
        }
    }
}

impl From<UserType> for i64 {
    fn from(value: UserType) -> Self {
        value.as_i64()
    }
}

/// 功能权限，对应 permission1..permission8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// 系统设置
    SystemSettings = 1,
    /// 设备管理
    DeviceManagement = 2,
    /// 设备维护（开门、消防复位、校时）
    DeviceMaintenance = 3,
    /// 人员管理
    PeopleManagement = 4,
    /// 统计查询
    Statistics = 5,
    Reserved6 = 6,
    Reserved7 = 7,
    Reserved8 = 8,
}

impl Permission {
    fn slot(self) -> usize {
        self as usize - 1
    }
}

/// 控制器用户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerUser {
    pub id: i64,
    pub username: String,
    /// bcrypt 哈希，永远不序列化
    #[serde(skip_serializing, default)]
    pub password: String,
    /// 当前有效 token，空字符串表示未登录
    #[serde(skip_serializing, default)]
    pub token: String,
    pub user_type: UserType,
    pub permission1: bool,
    pub permission2: bool,
    pub permission3: bool,
    pub permission4: bool,
    pub permission5: bool,
    pub permission6: bool,
    pub permission7: bool,
    pub permission8: bool,
    /// 最后登录时间（Unix 秒）
    pub last_login_time: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ControllerUser {
    pub fn permissions(&self) -> [bool; 8] {
        [
            self.permission1,
            self.permission2,
            self.permission3,
            self.permission4,
            self.permission5,
            self.permission6,
            self.permission7,
            self.permission8,
        ]
    }

    /// 权限位只对普通用户生效，其余类型拥有全部权限
    pub fn has_permission(&self, permission: Permission) -> bool {
        match self.user_type {
            UserType::OwnsaUser => self.permissions()[permission.slot()],
            UserType::Internal | UserType::Factory | UserType::Manager => true,
        }
    }
}

/// 权限位的稀疏更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionPatch {
    pub permission1: Option<bool>,
    pub permission2: Option<bool>,
    pub permission3: Option<bool>,
    pub permission4: Option<bool>,
    pub permission5: Option<bool>,
    pub permission6: Option<bool>,
    pub permission7: Option<bool>,
    pub permission8: Option<bool>,
}

impl PermissionPatch {
    pub fn apply(&self, user: &mut ControllerUser) {
        let pairs = [
            (self.permission1, &mut user.permission1),
            (self.permission2, &mut user.permission2),
            (self.permission3, &mut user.permission3),
            (self.permission4, &mut user.permission4),
            (self.permission5, &mut user.permission5),
            (self.permission6, &mut user.permission6),
            (self.permission7, &mut user.permission7),
            (self.permission8, &mut user.permission8),
        ];
        for (value, slot) in pairs {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }
}

/// 注册请求
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub user_type: Option<UserType>,
    #[serde(flatten)]
    pub permissions: PermissionPatch,
}

/// 管理员更新用户（只覆盖提供的字段）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerUserPatch {
    pub password: Option<String>,
    pub user_type: Option<UserType>,
    #[serde(flatten)]
    pub permissions: PermissionPatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub id: i64,
    pub user_type: UserType,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_type: UserType) -> ControllerUser {
        ControllerUser {
            id: 1,
            username: "op".to_string(),
            password: String::new(),
            token: String::new(),
            user_type,
            permission1: false,
            permission2: false,
            permission3: true,
            permission4: false,
            permission5: false,
            permission6: false,
            permission7: false,
            permission8: false,
            last_login_time: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_permission_bits_only_bind_ownsa_users() {
        let op = user(UserType::OwnsaUser);
        assert!(op.has_permission(Permission::DeviceMaintenance));
        assert!(!op.has_permission(Permission::SystemSettings));

        let manager = user(UserType::Manager);
        assert!(manager.has_permission(Permission::SystemSettings));
    }

    #[test]
    fn test_permission_patch_keeps_omitted_bits() {
        let mut op = user(UserType::OwnsaUser);
        let patch = PermissionPatch {
            permission1: Some(true),
            ..Default::default()
        };
        patch.apply(&mut op);
        assert!(op.permission1);
        assert!(op.permission3);
    }

    #[test]
    fn test_user_type_is_an_integer_on_the_wire() {
        let json = serde_json::to_string(&UserType::Factory).unwrap();
        assert_eq!(json, "1");
        assert!(serde_json::from_str::<UserType>("9").is_err());
    }

    #[test]
    fn test_serialized_user_hides_secrets() {
        let mut op = user(UserType::OwnsaUser);
        op.password = "hash".to_string();
        op.token = "tok".to_string();
        let json = serde_json::to_value(&op).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("token").is_none());
    }
}
