//! 凭证仓库
//!
//! 凭证与 `credential_access` 位于 credential 库，门禁组、门组位于 other_group 库，
//! 门位于 config 库。跨库关联全部按 ID 显式查询。
//!
//! 每个调用过 `update_door_access` 的凭证拥有一个专属门禁组（`owner_credential_id`）。
//! 替换门列表只改写专属门组的成员，并在 other_group 库的单个事务中完成；
//! `list_doors` 在同一个库的单个读事务中读取门禁组与成员，因此读者只会看到完整的旧集合
//! 或完整的新集合。

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::infra::Stores;
use crate::model::credential::{
    Credential, CredentialAccess, CredentialPatch, CredentialStatus, CredentialType,
    NewCredential,
};
use crate::model::group::{AccessGroup, Door};

#[derive(sqlx::FromRow)]
struct CredentialRow {
    unique_id: i64,
    people_id: i64,
    credential_type: i64,
    card_no: Option<String>,
    biometric: Option<String>,
    status: i64,
    valid_from: Option<i64>,
    valid_until: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = ServerError;

    fn try_from(r: CredentialRow) -> Result<Self> {
        Ok(Credential {
            unique_id: r.unique_id,
            people_id: r.people_id,
            credential_type: CredentialType::try_from(r.credential_type)
                .map_err(ServerError::Database)?,
            card_no: r.card_no,
            biometric: r.biometric,
            status: CredentialStatus::try_from(r.status).map_err(ServerError::Database)?,
            valid_from: r.valid_from,
            valid_until: r.valid_until,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const SELECT_CREDENTIAL: &str = r#"
    SELECT unique_id, people_id, credential_type, card_no, biometric, status,
           valid_from, valid_until, created_at, updated_at
    FROM credential
"#;

/// 按 ID 批量读取门，结果按 ID 排序
pub(crate) async fn load_doors(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Door>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, interface_board_id, ib_addr, output_addr, name FROM door WHERE id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");

    let doors = qb
        .build_query_as::<Door>()
        .fetch_all(pool)
        .await
        .map_err(|e| ServerError::Database(format!("查询门失败: {}", e)))?;
    Ok(doors)
}

/// 凭证仓库
#[derive(Clone)]
pub struct CredentialRepository {
    stores: Arc<Stores>,
}

impl CredentialRepository {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self { stores }
    }

    async fn people_exists(&self, people_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM people WHERE id = ?")
            .bind(people_id)
            .fetch_optional(&self.stores.credential)
            .await?;
        Ok(found.is_some())
    }

    /// 创建凭证，`people_id` 必须指向已存在的人员
    pub async fn create(&self, new: &NewCredential) -> Result<Credential> {
        if !self.people_exists(new.people_id).await? {
            return Err(ServerError::Validation(format!(
                "人员 {} 不存在",
                new.people_id
            )));
        }

        let now = Utc::now().timestamp();
        let credential_type = new.credential_type.unwrap_or(CredentialType::Card);
        let status = new.status.unwrap_or(CredentialStatus::Active);

        let result = sqlx::query(
            r#"
            INSERT INTO credential (
                people_id, credential_type, card_no, biometric, status,
                valid_from, valid_until, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.people_id)
        .bind(i64::from(credential_type))
        .bind(&new.card_no)
        .bind(&new.biometric)
        .bind(i64::from(status))
        .bind(new.valid_from)
        .bind(new.valid_until)
        .bind(now)
        .bind(now)
        .execute(&self.stores.credential)
        .await
        .map_err(|e| ServerError::Database(format!("创建凭证失败: {}", e)))?;

        let id = result.last_insert_rowid();
        info!(credential_id = id, people_id = new.people_id, "✅ 凭证已创建");

        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::Internal(format!("新建凭证 {} 读取失败", id)))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "{SELECT_CREDENTIAL} WHERE unique_id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.stores.credential)
        .await
        .map_err(|e| ServerError::Database(format!("查询凭证失败: {}", e)))?;

        row.map(Credential::try_from).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<Credential>> {
        let rows =
            sqlx::query_as::<_, CredentialRow>(&format!("{SELECT_CREDENTIAL} ORDER BY unique_id"))
                .fetch_all(&self.stores.credential)
                .await
                .map_err(|e| ServerError::Database(format!("查询凭证列表失败: {}", e)))?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    /// 稀疏更新：只覆盖 patch 中给出的字段
    pub async fn update(&self, id: i64, patch: &CredentialPatch) -> Result<Credential> {
        let mut credential = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("凭证 {} 不存在", id)))?;

        if let Some(people_id) = patch.people_id {
            if !self.people_exists(people_id).await? {
                return Err(ServerError::Validation(format!("人员 {} 不存在", people_id)));
            }
        }

        patch.apply(&mut credential);
        credential.updated_at = Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE credential
            SET people_id = ?, credential_type = ?, card_no = ?, biometric = ?, status = ?,
                valid_from = ?, valid_until = ?, updated_at = ?
            WHERE unique_id = ?
            "#,
        )
        .bind(credential.people_id)
        .bind(i64::from(credential.credential_type))
        .bind(&credential.card_no)
        .bind(&credential.biometric)
        .bind(i64::from(credential.status))
        .bind(credential.valid_from)
        .bind(credential.valid_until)
        .bind(credential.updated_at)
        .bind(id)
        .execute(&self.stores.credential)
        .await
        .map_err(|e| ServerError::Database(format!("更新凭证失败: {}", e)))?;

        Ok(credential)
    }

    /// 删除凭证及其门禁关联，然后回收其专属门禁组
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.stores.credential.begin().await?;

        sqlx::query("DELETE FROM credential_access WHERE credential_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM credential WHERE unique_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ServerError::NotFound(format!("凭证 {} 不存在", id)));
        }

        tx.commit().await?;
        info!(credential_id = id, "🗑 凭证已删除");

        self.drop_dedicated_groups(&[id]).await
    }

    /// 回收专属于这些凭证的门禁组与门组
    pub async fn drop_dedicated_groups(&self, credential_ids: &[i64]) -> Result<()> {
        if credential_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.stores.other_group.begin().await?;
        for id in credential_ids {
            let group = sqlx::query_as::<_, AccessGroup>(
                "SELECT id, name, door_group_id, sched_group_id, owner_credential_id
                 FROM access_group WHERE owner_credential_id = ?",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(group) = group {
                sqlx::query("DELETE FROM door_group_member WHERE door_group_id = ?")
                    .bind(group.door_group_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM door_group WHERE id = ?")
                    .bind(group.door_group_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM access_group WHERE id = ?")
                    .bind(group.id)
                    .execute(&mut *tx)
                    .await?;
                debug!(credential_id = id, access_group_id = group.id, "回收专属门禁组");
            }
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_access(&self, credential_id: i64) -> Result<Option<CredentialAccess>> {
        let access = sqlx::query_as::<_, CredentialAccess>(
            "SELECT credential_id, access_group_id, updated_at
             FROM credential_access WHERE credential_id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&self.stores.credential)
        .await?;
        Ok(access)
    }

    /// 解析凭证可通行的门：CredentialAccess → AccessGroup → DoorGroup → Door
    ///
    /// 凭证不存在时返回 `NotFound`；凭证存在但未分配门禁组时返回空集合
    pub async fn list_doors(&self, credential_id: i64) -> Result<Vec<Door>> {
        if self.find_by_id(credential_id).await?.is_none() {
            return Err(ServerError::NotFound(format!("凭证 {} 不存在", credential_id)));
        }

        let Some(access) = self.find_access(credential_id).await? else {
            return Ok(Vec::new());
        };

        let mut tx = self.stores.other_group.begin().await?;
        let door_group_id: Option<i64> =
            sqlx::query_scalar("SELECT door_group_id FROM access_group WHERE id = ?")
                .bind(access.access_group_id)
                .fetch_optional(&mut *tx)
                .await?;

        let door_ids: Vec<i64> = match door_group_id {
            Some(door_group_id) => {
                sqlx::query_scalar(
                    "SELECT door_id FROM door_group_member WHERE door_group_id = ? ORDER BY door_id",
                )
                .bind(door_group_id)
                .fetch_all(&mut *tx)
                .await?
            }
            None => Vec::new(),
        };
        tx.commit().await?;

        load_doors(&self.stores.config, &door_ids).await
    }

    /// 以原子方式替换凭证可通行的门与时间组，返回新的门列表
    pub async fn update_door_access(
        &self,
        credential_id: i64,
        door_ids: &[i64],
        sched_group_id: i64,
    ) -> Result<Vec<Door>> {
        if self.find_by_id(credential_id).await?.is_none() {
            return Err(ServerError::NotFound(format!("凭证 {} 不存在", credential_id)));
        }

        let door_ids: Vec<i64> = door_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let doors = load_doors(&self.stores.config, &door_ids).await?;
        if doors.len() != door_ids.len() {
            let missing: Vec<i64> = door_ids
                .iter()
                .filter(|id| !doors.iter().any(|d| d.id == **id))
                .copied()
                .collect();
            return Err(ServerError::Validation(format!("门不存在: {:?}", missing)));
        }

        let now = Utc::now().timestamp();
        let mut tx = self.stores.other_group.begin().await?;

        let sched_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM sched_group WHERE id = ?")
            .bind(sched_group_id)
            .fetch_optional(&mut *tx)
            .await?;
        if sched_exists.is_none() {
            tx.rollback().await?;
            return Err(ServerError::Validation(format!(
                "时间组 {} 不存在",
                sched_group_id
            )));
        }

        let existing = sqlx::query_as::<_, AccessGroup>(
            "SELECT id, name, door_group_id, sched_group_id, owner_credential_id
             FROM access_group WHERE owner_credential_id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (access_group_id, door_group_id) = match existing {
            Some(group) => {
                sqlx::query("DELETE FROM door_group_member WHERE door_group_id = ?")
                    .bind(group.door_group_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE access_group SET sched_group_id = ? WHERE id = ?")
                    .bind(sched_group_id)
                    .bind(group.id)
                    .execute(&mut *tx)
                    .await?;
                (group.id, group.door_group_id)
            }
            None => {
                let name = format!("credential-{}", credential_id);
                let door_group_id = sqlx::query("INSERT INTO door_group (name) VALUES (?)")
                    .bind(&name)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                let access_group_id = sqlx::query(
                    "INSERT INTO access_group (name, door_group_id, sched_group_id, owner_credential_id)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&name)
                .bind(door_group_id)
                .bind(sched_group_id)
                .bind(credential_id)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
                (access_group_id, door_group_id)
            }
        };

        for door_id in &door_ids {
            sqlx::query("INSERT INTO door_group_member (door_group_id, door_id) VALUES (?, ?)")
                .bind(door_group_id)
                .bind(door_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.upsert_access(credential_id, access_group_id, now).await?;

        info!(
            credential_id,
            access_group_id,
            doors = door_ids.len(),
            "🚪 凭证门禁已更新"
        );
        Ok(doors)
    }

    /// 把凭证指向一个（可能共享的）门禁组，后写覆盖先写
    pub async fn assign_access_group(&self, credential_id: i64, access_group_id: i64) -> Result<()> {
        if self.find_by_id(credential_id).await?.is_none() {
            return Err(ServerError::NotFound(format!("凭证 {} 不存在", credential_id)));
        }

        let group: Option<i64> = sqlx::query_scalar("SELECT id FROM access_group WHERE id = ?")
            .bind(access_group_id)
            .fetch_optional(&self.stores.other_group)
            .await?;
        if group.is_none() {
            return Err(ServerError::Validation(format!(
                "门禁组 {} 不存在",
                access_group_id
            )));
        }

        self.upsert_access(credential_id, access_group_id, Utc::now().timestamp())
            .await
    }

    async fn upsert_access(&self, credential_id: i64, access_group_id: i64, now: i64) -> Result<()> {
        let mut tx = self.stores.credential.begin().await?;

        // 凭证可能已被并发删除，不留下悬空的关联
        let alive: Option<i64> = sqlx::query_scalar("SELECT unique_id FROM credential WHERE unique_id = ?")
            .bind(credential_id)
            .fetch_optional(&mut *tx)
            .await?;
        if alive.is_none() {
            tx.rollback().await?;
            return Err(ServerError::NotFound(format!("凭证 {} 不存在", credential_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO credential_access (credential_id, access_group_id, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (credential_id)
            DO UPDATE SET access_group_id = excluded.access_group_id, updated_at = excluded.updated_at
            "#,
        )
        .bind(credential_id)
        .bind(access_group_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// 控制器上配置的全部门
    pub async fn all_doors(&self) -> Result<Vec<Door>> {
        let doors = sqlx::query_as::<_, Door>(
            "SELECT id, interface_board_id, ib_addr, output_addr, name FROM door ORDER BY id",
        )
        .fetch_all(&self.stores.config)
        .await?;
        Ok(doors)
    }
}
