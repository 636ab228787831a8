//! 门组 / 时间组 / 门禁组仓库（other_group 库）

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{Result, ServerError};
use crate::infra::Stores;
use crate::model::group::{
    AccessGroup, DoorGroup, NewAccessGroup, NewDoorGroup, NewSchedGroup, SchedGroup, SchedWindow,
};
use crate::repository::credential_repo::load_doors;

#[derive(Clone)]
pub struct GroupRepository {
    stores: Arc<Stores>,
}

impl GroupRepository {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self { stores }
    }

    // ---- 门组 ----

    pub async fn create_door_group(&self, new: &NewDoorGroup) -> Result<DoorGroup> {
        let door_ids: Vec<i64> = new.door_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let doors = load_doors(&self.stores.config, &door_ids).await?;
        if doors.len() != door_ids.len() {
            return Err(ServerError::Validation("门组中包含不存在的门".to_string()));
        }

        let mut tx = self.stores.other_group.begin().await?;
        let id = sqlx::query("INSERT INTO door_group (name) VALUES (?)")
            .bind(&new.name)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        for door_id in &door_ids {
            sqlx::query("INSERT INTO door_group_member (door_group_id, door_id) VALUES (?, ?)")
                .bind(id)
                .bind(door_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(DoorGroup {
            id,
            name: new.name.clone(),
            door_ids,
        })
    }

    pub async fn find_door_group(&self, id: i64) -> Result<Option<DoorGroup>> {
        let mut tx = self.stores.other_group.begin().await?;
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM door_group WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(name) = name else {
            return Ok(None);
        };
        let door_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT door_id FROM door_group_member WHERE door_group_id = ? ORDER BY door_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(DoorGroup { id, name, door_ids }))
    }

    pub async fn list_door_groups(&self) -> Result<Vec<DoorGroup>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM door_group ORDER BY id")
            .fetch_all(&self.stores.other_group)
            .await?;

        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = self.find_door_group(id).await? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    // ---- 时间组 ----

    pub async fn create_sched_group(&self, new: &NewSchedGroup) -> Result<SchedGroup> {
        if let Some(bad) = new.windows.iter().find(|w| !w.is_valid()) {
            return Err(ServerError::Validation(format!("无效的时间窗: {:?}", bad)));
        }

        let mut tx = self.stores.other_group.begin().await?;
        let id = sqlx::query("INSERT INTO sched_group (name) VALUES (?)")
            .bind(&new.name)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        for window in &new.windows {
            sqlx::query(
                "INSERT INTO sched_window (sched_group_id, weekday, start_minute, end_minute)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(window.weekday)
            .bind(window.start_minute)
            .bind(window.end_minute)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(SchedGroup {
            id,
            name: new.name.clone(),
            windows: new.windows.clone(),
        })
    }

    pub async fn find_sched_group(&self, id: i64) -> Result<Option<SchedGroup>> {
        let mut tx = self.stores.other_group.begin().await?;
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM sched_group WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(name) = name else {
            return Ok(None);
        };
        let windows = sqlx::query_as::<_, SchedWindow>(
            "SELECT weekday, start_minute, end_minute FROM sched_window
             WHERE sched_group_id = ? ORDER BY weekday, start_minute",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(SchedGroup { id, name, windows }))
    }

    pub async fn list_sched_groups(&self) -> Result<Vec<SchedGroup>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM sched_group ORDER BY id")
            .fetch_all(&self.stores.other_group)
            .await?;

        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = self.find_sched_group(id).await? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    // ---- 门禁组 ----

    pub async fn create_access_group(&self, new: &NewAccessGroup) -> Result<AccessGroup> {
        let mut tx = self.stores.other_group.begin().await?;

        let door_group: Option<i64> = sqlx::query_scalar("SELECT id FROM door_group WHERE id = ?")
            .bind(new.door_group_id)
            .fetch_optional(&mut *tx)
            .await?;
        let sched_group: Option<i64> = sqlx::query_scalar("SELECT id FROM sched_group WHERE id = ?")
            .bind(new.sched_group_id)
            .fetch_optional(&mut *tx)
            .await?;
        if door_group.is_none() || sched_group.is_none() {
            return Err(ServerError::Validation(format!(
                "门组 {} 或时间组 {} 不存在",
                new.door_group_id, new.sched_group_id
            )));
        }

        let id = sqlx::query(
            "INSERT INTO access_group (name, door_group_id, sched_group_id) VALUES (?, ?, ?)",
        )
        .bind(&new.name)
        .bind(new.door_group_id)
        .bind(new.sched_group_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        Ok(AccessGroup {
            id,
            name: new.name.clone(),
            door_group_id: new.door_group_id,
            sched_group_id: new.sched_group_id,
            owner_credential_id: None,
        })
    }

    pub async fn find_access_group(&self, id: i64) -> Result<Option<AccessGroup>> {
        let group = sqlx::query_as::<_, AccessGroup>(
            "SELECT id, name, door_group_id, sched_group_id, owner_credential_id
             FROM access_group WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.stores.other_group)
        .await?;
        Ok(group)
    }

    pub async fn list_access_groups(&self) -> Result<Vec<AccessGroup>> {
        let groups = sqlx::query_as::<_, AccessGroup>(
            "SELECT id, name, door_group_id, sched_group_id, owner_credential_id
             FROM access_group ORDER BY id",
        )
        .fetch_all(&self.stores.other_group)
        .await?;
        Ok(groups)
    }
}
