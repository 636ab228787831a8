//! 人员与部门仓库（credential 库）

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{Result, ServerError};
use crate::infra::Stores;
use crate::model::people::{Department, NewDepartment, NewPeople, People, PeoplePatch};

const SELECT_PEOPLE: &str = r#"
    SELECT id, first_name, last_name, code, department_id, card_no, created_at, updated_at
    FROM people
"#;

#[derive(Clone)]
pub struct PeopleRepository {
    stores: Arc<Stores>,
}

impl PeopleRepository {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self { stores }
    }

    async fn department_exists(&self, id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM department WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.stores.credential)
            .await?;
        Ok(found.is_some())
    }

    pub async fn create(&self, new: &NewPeople) -> Result<People> {
        if let Some(department_id) = new.department_id {
            if !self.department_exists(department_id).await? {
                return Err(ServerError::Validation(format!("部门 {} 不存在", department_id)));
            }
        }

        let now = Utc::now().timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO people (first_name, last_name, code, department_id, card_no, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.code)
        .bind(new.department_id)
        .bind(&new.card_no)
        .bind(now)
        .bind(now)
        .execute(&self.stores.credential)
        .await
        .map_err(|e| ServerError::Database(format!("创建人员失败: {}", e)))?
        .last_insert_rowid();

        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::Internal(format!("新建人员 {} 读取失败", id)))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<People>> {
        let people = sqlx::query_as::<_, People>(&format!("{SELECT_PEOPLE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.stores.credential)
            .await?;
        Ok(people)
    }

    pub async fn find_all(&self) -> Result<Vec<People>> {
        let people = sqlx::query_as::<_, People>(&format!("{SELECT_PEOPLE} ORDER BY id"))
            .fetch_all(&self.stores.credential)
            .await?;
        Ok(people)
    }

    pub async fn update(&self, id: i64, patch: &PeoplePatch) -> Result<People> {
        let mut people = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("人员 {} 不存在", id)))?;

        if let Some(department_id) = patch.department_id {
            if !self.department_exists(department_id).await? {
                return Err(ServerError::Validation(format!("部门 {} 不存在", department_id)));
            }
        }

        patch.apply(&mut people);
        people.updated_at = Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE people
            SET first_name = ?, last_name = ?, code = ?, department_id = ?, card_no = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&people.first_name)
        .bind(&people.last_name)
        .bind(&people.code)
        .bind(people.department_id)
        .bind(&people.card_no)
        .bind(people.updated_at)
        .bind(id)
        .execute(&self.stores.credential)
        .await?;

        Ok(people)
    }

    /// 删除人员及其全部凭证和门禁关联，返回被删除的凭证 ID
    pub async fn delete(&self, id: i64) -> Result<Vec<i64>> {
        let mut tx = self.stores.credential.begin().await?;

        let credential_ids: Vec<i64> =
            sqlx::query_scalar("SELECT unique_id FROM credential WHERE people_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        for credential_id in &credential_ids {
            sqlx::query("DELETE FROM credential_access WHERE credential_id = ?")
                .bind(credential_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM credential WHERE people_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM people WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ServerError::NotFound(format!("人员 {} 不存在", id)));
        }

        tx.commit().await?;
        info!(people_id = id, credentials = credential_ids.len(), "🗑 人员已删除");
        Ok(credential_ids)
    }
}

#[derive(Clone)]
pub struct DepartmentRepository {
    stores: Arc<Stores>,
}

impl DepartmentRepository {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self { stores }
    }

    pub async fn create(&self, new: &NewDepartment) -> Result<Department> {
        let now = Utc::now().timestamp();
        let id = sqlx::query("INSERT INTO department (name, created_at) VALUES (?, ?)")
            .bind(&new.name)
            .bind(now)
            .execute(&self.stores.credential)
            .await?
            .last_insert_rowid();

        Ok(Department {
            id,
            name: new.name.clone(),
            created_at: now,
        })
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Department>> {
        let department = sqlx::query_as::<_, Department>(
            "SELECT id, name, created_at FROM department WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.stores.credential)
        .await?;
        Ok(department)
    }

    pub async fn find_all(&self) -> Result<Vec<Department>> {
        let departments =
            sqlx::query_as::<_, Department>("SELECT id, name, created_at FROM department ORDER BY id")
                .fetch_all(&self.stores.credential)
                .await?;
        Ok(departments)
    }

    /// 仍有人员引用该部门时拒绝删除
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.stores.credential.begin().await?;

        let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM people WHERE department_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if members > 0 {
            tx.rollback().await?;
            return Err(ServerError::Validation(format!(
                "部门 {} 下仍有 {} 名人员",
                id, members
            )));
        }

        let result = sqlx::query("DELETE FROM department WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ServerError::NotFound(format!("部门 {} 不存在", id)));
        }

        tx.commit().await?;
        Ok(())
    }
}
