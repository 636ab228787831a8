//! 控制器用户仓库（config 库）

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Result, ServerError};
use crate::infra::Stores;
use crate::model::controller_user::{ControllerUser, UserType};

#[derive(sqlx::FromRow)]
struct ControllerUserRow {
    id: i64,
    username: String,
    password: String,
    token: String,
    user_type: i64,
    permission1: bool,
    permission2: bool,
    permission3: bool,
    permission4: bool,
    permission5: bool,
    permission6: bool,
    permission7: bool,
    permission8: bool,
    last_login_time: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ControllerUserRow> for ControllerUser {
    type Error = ServerError;

    fn try_from(r: ControllerUserRow) -> Result<Self> {
        Ok(ControllerUser {
            id: r.id,
            username: r.username,
            password: r.password,
            token: r.token,
            user_type: UserType::try_from(r.user_type).map_err(ServerError::Database)?,
            permission1: r.permission1,
            permission2: r.permission2,
            permission3: r.permission3,
            permission4: r.permission4,
            permission5: r.permission5,
            permission6: r.permission6,
            permission7: r.permission7,
            permission8: r.permission8,
            last_login_time: r.last_login_time,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT id, username, password, token, user_type,
           permission1, permission2, permission3, permission4,
           permission5, permission6, permission7, permission8,
           last_login_time, created_at, updated_at
    FROM controller_user
"#;

/// 控制器用户仓库
#[derive(Clone)]
pub struct ControllerUserRepository {
    stores: Arc<Stores>,
}

impl ControllerUserRepository {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self { stores }
    }

    /// 根据 ID 查找用户
    pub async fn find_by_id(&self, id: i64) -> Result<Option<ControllerUser>> {
        let row = sqlx::query_as::<_, ControllerUserRow>(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.stores.config)
            .await
            .map_err(|e| ServerError::Database(format!("查询用户失败: {}", e)))?;

        row.map(ControllerUser::try_from).transpose()
    }

    /// 根据用户名查找用户
    pub async fn find_by_username(&self, username: &str) -> Result<Option<ControllerUser>> {
        let row =
            sqlx::query_as::<_, ControllerUserRow>(&format!("{SELECT_USER} WHERE username = ?"))
                .bind(username)
                .fetch_optional(&self.stores.config)
                .await
                .map_err(|e| ServerError::Database(format!("查询用户失败: {}", e)))?;

        row.map(ControllerUser::try_from).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<ControllerUser>> {
        let rows = sqlx::query_as::<_, ControllerUserRow>(&format!("{SELECT_USER} ORDER BY id"))
            .fetch_all(&self.stores.config)
            .await
            .map_err(|e| ServerError::Database(format!("查询用户列表失败: {}", e)))?;

        rows.into_iter().map(ControllerUser::try_from).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM controller_user")
            .fetch_one(&self.stores.config)
            .await?;
        Ok(count)
    }

    /// 创建用户，`user.id` 与时间戳由数据库生成
    pub async fn create(&self, user: &ControllerUser) -> Result<ControllerUser> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO controller_user (
                username, password, token, user_type,
                permission1, permission2, permission3, permission4,
                permission5, permission6, permission7, permission8,
                last_login_time, created_at, updated_at
            )
            VALUES (?, ?, '', ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.user_type.as_i64())
        .bind(user.permission1)
        .bind(user.permission2)
        .bind(user.permission3)
        .bind(user.permission4)
        .bind(user.permission5)
        .bind(user.permission6)
        .bind(user.permission7)
        .bind(user.permission8)
        .bind(now)
        .bind(now)
        .execute(&self.stores.config)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ServerError::Validation(format!("用户名已存在: {}", user.username))
            }
            other => ServerError::Database(format!("创建用户失败: {}", other)),
        })?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::Internal(format!("新建用户 {} 读取失败", id)))
    }

    /// 写回密码、类型与权限位
    pub async fn update(&self, user: &ControllerUser) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE controller_user
            SET password = ?, user_type = ?,
                permission1 = ?, permission2 = ?, permission3 = ?, permission4 = ?,
                permission5 = ?, permission6 = ?, permission7 = ?, permission8 = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.password)
        .bind(user.user_type.as_i64())
        .bind(user.permission1)
        .bind(user.permission2)
        .bind(user.permission3)
        .bind(user.permission4)
        .bind(user.permission5)
        .bind(user.permission6)
        .bind(user.permission7)
        .bind(user.permission8)
        .bind(Utc::now().timestamp())
        .bind(user.id)
        .execute(&self.stores.config)
        .await
        .map_err(|e| ServerError::Database(format!("更新用户失败: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound(format!("用户 {} 不存在", user.id)));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM controller_user WHERE id = ?")
            .bind(id)
            .execute(&self.stores.config)
            .await
            .map_err(|e| ServerError::Database(format!("删除用户失败: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound(format!("用户 {} 不存在", id)));
        }
        Ok(())
    }

    /// 覆盖保存的 token；空字符串表示登出
    pub async fn set_token(&self, id: i64, token: &str) -> Result<()> {
        let result = sqlx::query("UPDATE controller_user SET token = ? WHERE id = ?")
            .bind(token)
            .bind(id)
            .execute(&self.stores.config)
            .await
            .map_err(|e| ServerError::Database(format!("保存 token 失败: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound(format!("用户 {} 不存在", id)));
        }
        Ok(())
    }

    /// 读取保存的 token，用户不存在时返回 `None`
    pub async fn find_token(&self, id: i64) -> Result<Option<String>> {
        let token: Option<String> =
            sqlx::query_scalar("SELECT token FROM controller_user WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.stores.config)
                .await
                .map_err(|e| ServerError::Database(format!("读取 token 失败: {}", e)))?;
        Ok(token)
    }

    pub async fn touch_last_login(&self, id: i64, at: i64) -> Result<()> {
        sqlx::query("UPDATE controller_user SET last_login_time = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.stores.config)
            .await?;
        Ok(())
    }
}
