//! 控制器用户服务：登录、登出、改密、权限检查与工厂设置
//!
//! 账号状态：未登录（token 为空）→ 已登录（token 已保存）→ 未登录（显式登出），
//! 或者被另一处登录静默顶替（保存的 token 被覆盖，旧 token 从此校验失败）。

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, SessionStore};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result, ServerError};
use crate::infra::{metrics, Stores};
use crate::model::controller_user::{
    ChangePasswordRequest, ControllerUser, ControllerUserPatch, LoginRequest, LoginResponse,
    Permission, PermissionPatch, RegisterRequest, UserType,
};
use crate::model::device::{ControllerProp, ControllerPropPatch, FactorySetting};
use crate::repository::{ControllerUserRepository, DeviceRepository};
use crate::service::config_sync::ConfigSync;

const DUMMY_PASSWORD: &str = "ownsa-no-such-user";

pub struct ControllerUserService {
    users: Arc<ControllerUserRepository>,
    devices: Arc<DeviceRepository>,
    sessions: Arc<SessionStore>,
    stores: Arc<Stores>,
    sync: ConfigSync,
    auth: AuthConfig,
    factory_reset_marker: String,
    /// 用户不存在时用于比对的哈希，使两种登录失败的耗时一致
    dummy_hash: OnceCell<String>,
}

impl ControllerUserService {
    pub fn new(
        users: Arc<ControllerUserRepository>,
        devices: Arc<DeviceRepository>,
        sessions: Arc<SessionStore>,
        stores: Arc<Stores>,
        sync: ConfigSync,
        auth: AuthConfig,
        factory_reset_marker: String,
    ) -> Self {
        Self {
            users,
            devices,
            sessions,
            stores,
            sync,
            auth,
            factory_reset_marker,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// 登录
    ///
    /// 用户名不存在与密码错误返回同一个错误
    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        let found = self.users.find_by_username(&req.username).await?;
        let verified = match &found {
            Some(user) => verify_password(&req.password, &user.password),
            None => {
                let dummy = self
                    .dummy_hash
                    .get_or_try_init(|| async {
                        hash_password(DUMMY_PASSWORD, self.auth.password_cost)
                    })
                    .await?;
                let _ = verify_password(&req.password, dummy);
                false
            }
        };

        let user = match found {
            Some(user) if verified => user,
            _ => {
                metrics::record_login("failure");
                warn!(username = %req.username, "🔐 登录失败");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let token = self
            .sessions
            .issue_token(user.id, &user.username, self.auth.token_ttl_minutes)
            .await?;
        self.users
            .touch_last_login(user.id, Utc::now().timestamp())
            .await?;

        metrics::record_login("success");
        info!(user_id = user.id, username = %user.username, "🔐 登录成功");

        Ok(LoginResponse {
            id: user.id,
            user_type: user.user_type,
            token,
        })
    }

    /// 登出：清空保存的 token
    pub async fn logout(&self, user_id: i64) -> Result<()> {
        self.sessions.clear_token(user_id).await
    }

    /// 修改自己的密码，不影响当前会话
    pub async fn change_password(&self, user_id: i64, req: &ChangePasswordRequest) -> Result<()> {
        let mut user = self.require_user(user_id).await?;

        if !verify_password(&req.password, &user.password) {
            return Err(ServerError::Validation("原密码错误".to_string()));
        }
        if req.new_password.is_empty() {
            return Err(ServerError::Validation("新密码不能为空".to_string()));
        }

        user.password = hash_password(&req.new_password, self.auth.password_cost)?;
        self.users.update(&user).await?;
        info!(user_id, "🔑 密码已修改");
        Ok(())
    }

    /// 公开注册：只能创建没有任何权限位的普通用户
    ///
    /// 请求中的 `user_type` 与权限位在这里被忽略，提升权限只能走 [`Self::create_user`] 或 [`Self::update`]。
    pub async fn register(&self, req: &RegisterRequest) -> Result<ControllerUser> {
        if req.user_type.is_some_and(|t| t != UserType::OwnsaUser) {
            warn!(username = %req.username, "👤 公开注册忽略请求的用户类型");
        }
        self.insert_user(req, UserType::OwnsaUser, &PermissionPatch::default())
            .await
    }

    /// 管理员创建用户（系统设置权限），可指定用户类型与权限位
    pub async fn create_user(&self, caller_id: i64, req: &RegisterRequest) -> Result<ControllerUser> {
        self.authorize(caller_id, Permission::SystemSettings).await?;
        let user_type = req.user_type.unwrap_or(UserType::OwnsaUser);
        self.insert_user(req, user_type, &req.permissions).await
    }

    async fn insert_user(
        &self,
        req: &RegisterRequest,
        user_type: UserType,
        permissions: &PermissionPatch,
    ) -> Result<ControllerUser> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(ServerError::Validation("用户名和密码不能为空".to_string()));
        }

        let mut user = ControllerUser {
            id: 0,
            username: req.username.trim().to_string(),
            password: hash_password(&req.password, self.auth.password_cost)?,
            token: String::new(),
            user_type,
            permission1: false,
            permission2: false,
            permission3: false,
            permission4: false,
            permission5: false,
            permission6: false,
            permission7: false,
            permission8: false,
            last_login_time: 0,
            created_at: 0,
            updated_at: 0,
        };
        permissions.apply(&mut user);

        let user = self.users.create(&user).await?;
        info!(user_id = user.id, username = %user.username, user_type = user_type.as_i64(), "👤 用户已创建");
        Ok(user)
    }

    /// 没有任何用户时创建初始管理员
    pub async fn seed_admin(&self, username: &str, password: &str) -> Result<Option<ControllerUser>> {
        if self.users.count().await? > 0 {
            return Ok(None);
        }

        let req = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            user_type: Some(UserType::Manager),
            permissions: PermissionPatch::default(),
        };
        self.insert_user(&req, UserType::Manager, &req.permissions)
            .await
            .map(Some)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<ControllerUser> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("用户 {} 不存在", id)))
    }

    pub async fn find_all(&self) -> Result<Vec<ControllerUser>> {
        self.users.find_all().await
    }

    /// 管理员更新用户：只覆盖提供的字段
    pub async fn update(&self, id: i64, patch: &ControllerUserPatch) -> Result<ControllerUser> {
        let mut user = self.find_by_id(id).await?;

        if let Some(password) = &patch.password {
            if password.is_empty() {
                return Err(ServerError::Validation("密码不能为空".to_string()));
            }
            user.password = hash_password(password, self.auth.password_cost)?;
        }
        if let Some(user_type) = patch.user_type {
            user.user_type = user_type;
        }
        patch.permissions.apply(&mut user);

        self.users.update(&user).await?;
        self.find_by_id(id).await
    }

    pub async fn delete(&self, caller_id: i64, id: i64) -> Result<()> {
        if caller_id == id {
            return Err(ServerError::Validation("不能删除当前登录的用户".to_string()));
        }
        self.users.delete(id).await?;
        info!(user_id = id, "👤 用户已删除");
        Ok(())
    }

    async fn require_user(&self, user_id: i64) -> Result<ControllerUser> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(ServerError::Auth(AuthError::UserNotFound))
    }

    /// 要求调用者拥有某项权限
    pub async fn authorize(&self, user_id: i64, permission: Permission) -> Result<ControllerUser> {
        let user = self.require_user(user_id).await?;
        if !user.has_permission(permission) {
            return Err(ServerError::PermissionDenied(format!(
                "缺少权限 {:?}",
                permission
            )));
        }
        Ok(user)
    }

    // ---- 控制器属性 ----

    /// 公开的工厂设置读取
    pub async fn get_factory_set(&self) -> Result<FactorySetting> {
        let prop = self.devices.find_prop().await?;
        Ok(FactorySetting::from(&prop))
    }

    /// 工厂设置：只有工厂账号可以调用
    pub async fn factory_set(&self, user_id: i64, setting: &FactorySetting) -> Result<FactorySetting> {
        let user = self.require_user(user_id).await?;
        if user.user_type != UserType::Factory {
            return Err(ServerError::PermissionDenied("只有工厂账号可以修改工厂设置".to_string()));
        }

        let patch = ControllerPropPatch {
            controller_name: None,
            bp_type: Some(setting.bp_type),
            product_type: Some(setting.product_type),
            is_double_line: Some(setting.is_double_line),
            is_ownsa: Some(setting.is_ownsa),
            is_bak_ctl: Some(setting.is_bak_ctl),
        };
        let prop = self.write_prop(&patch).await?;
        info!(user_id, "🏭 工厂设置已更新");
        Ok(FactorySetting::from(&prop))
    }

    pub async fn find_controller_prop(&self) -> Result<ControllerProp> {
        self.devices.find_prop().await
    }

    /// 更新控制器属性（系统设置权限）
    pub async fn update_controller_prop(
        &self,
        user_id: i64,
        patch: &ControllerPropPatch,
    ) -> Result<ControllerProp> {
        self.authorize(user_id, Permission::SystemSettings).await?;
        self.write_prop(patch).await
    }

    /// 写入属性后通知设备后端并把配置库刷盘
    async fn write_prop(&self, patch: &ControllerPropPatch) -> Result<ControllerProp> {
        let mut prop = self.devices.find_prop().await?;
        patch.apply(&mut prop);
        prop.updated_at = Utc::now().timestamp();

        self.devices.update_prop(&prop).await?;
        self.sync.config_sync();
        self.stores.flush_config().await?;
        Ok(prop)
    }

    /// 恢复出厂：写入标记文件，下次启动时清空所有存储
    pub async fn factory_reset(&self, user_id: i64) -> Result<()> {
        self.authorize(user_id, Permission::SystemSettings).await?;

        let marker = Path::new(&self.factory_reset_marker);
        if let Some(parent) = marker.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(marker, Utc::now().to_rfc3339()).await?;

        warn!(user_id, marker = %self.factory_reset_marker, "♻️ 已请求恢复出厂，重启后生效");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::build_state;
    use crate::service::OsClock;

    async fn service() -> Arc<ControllerUserService> {
        let mut config = ServerConfig::default();
        config.auth.password_cost = 4;
        config.device.backend_base_url = "http://127.0.0.1:9/".to_string();
        config.device.sync_enabled = false;
        let stores = Arc::new(Stores::in_memory().await.unwrap());
        build_state(stores, &config, Arc::new(OsClock)).unwrap().users
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_user_still_runs_bcrypt() {
        let users = service().await;
        assert!(users.dummy_hash.get().is_none());

        let err = users.login(&login("ghost", "pw")).await.unwrap_err();
        assert!(matches!(err, ServerError::Auth(AuthError::InvalidCredentials)));

        let dummy = users.dummy_hash.get().unwrap();
        assert!(dummy.starts_with("$2"));
        assert!(!verify_password("pw", dummy));
    }

    #[tokio::test]
    async fn test_public_register_ignores_requested_privileges() {
        let users = service().await;
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "username": "eve",
            "password": "pw",
            "user_type": 1,
            "permission1": true,
        }))
        .unwrap();

        let user = users.register(&req).await.unwrap();
        assert_eq!(user.user_type, UserType::OwnsaUser);
        assert_eq!(user.permissions(), [false; 8]);
    }

    #[tokio::test]
    async fn test_create_user_requires_system_settings() {
        let users = service().await;
        let admin = users.seed_admin("root", "root-pw").await.unwrap().unwrap();
        let plain = users
            .register(&serde_json::from_value(serde_json::json!({
                "username": "plain",
                "password": "pw",
            })).unwrap())
            .await
            .unwrap();

        let factory_req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "username": "factory",
            "password": "pw",
            "user_type": 1,
        }))
        .unwrap();

        let err = users.create_user(plain.id, &factory_req).await.unwrap_err();
        assert!(matches!(err, ServerError::PermissionDenied(_)));

        let created = users.create_user(admin.id, &factory_req).await.unwrap();
        assert_eq!(created.user_type, UserType::Factory);
    }
}
