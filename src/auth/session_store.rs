//! 会话存储：每个账号只有一个有效 token
//!
//! token 的权威值保存在配置库 `controller_user.token` 列中。每次校验都重新读取该列并要求
//! 与请求携带的 token 完全一致，因此新的登录会让旧 token 立即失效，登出会清空该列。
//! 这里不做任何内存缓存。

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::jwt_service::JwtService;
use crate::error::{AuthError, Result};
use crate::infra::metrics;
use crate::repository::ControllerUserRepository;

pub struct SessionStore {
    jwt: JwtService,
    users: Arc<ControllerUserRepository>,
}

impl SessionStore {
    pub fn new(jwt: JwtService, users: Arc<ControllerUserRepository>) -> Self {
        Self { jwt, users }
    }

    /// 签发 token 并覆盖该用户当前保存的 token
    pub async fn issue_token(&self, user_id: i64, username: &str, ttl_minutes: u64) -> Result<String> {
        let token = self.jwt.issue(user_id, username, ttl_minutes)?;
        self.users.set_token(user_id, &token).await?;
        info!(user_id, "🔑 已签发会话 token");
        Ok(token)
    }

    /// 校验 token，成功时返回其中的用户 ID
    pub async fn verify_token(&self, token: &str) -> Result<i64> {
        let result = self.verify_inner(token).await;
        metrics::record_token_verify(match &result {
            Ok(_) => "ok",
            Err(_) => "rejected",
        });
        result
    }

    async fn verify_inner(&self, token: &str) -> Result<i64> {
        let claims = self.jwt.decode(token)?;
        let user_id = claims.user_id()?;

        let stored = self
            .users
            .find_token(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if stored.is_empty() || stored != token {
            debug!(user_id, "token 已被登出或被新的登录顶替");
            return Err(AuthError::ExpiredOrSuperseded.into());
        }

        Ok(user_id)
    }

    /// 清空保存的 token，使该用户所有已发出的 token 失效
    pub async fn clear_token(&self, user_id: i64) -> Result<()> {
        self.users.set_token(user_id, "").await?;
        info!(user_id, "🔒 会话已清除");
        Ok(())
    }
}
