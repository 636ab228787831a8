//! 凭证、人员、部门与门禁分组的业务入口
//!
//! 所有写操作成功后都会触发一次数据同步，通知设备后端重新加载。

use std::sync::Arc;

use crate::error::{Result, ServerError};
use crate::model::credential::{Credential, CredentialPatch, DoorAccessUpdate, NewCredential};
use crate::model::group::{
    AccessGroup, Door, DoorGroup, NewAccessGroup, NewDoorGroup, NewSchedGroup, SchedGroup,
};
use crate::model::people::{Department, NewDepartment, NewPeople, People, PeoplePatch};
use crate::repository::{
    CredentialRepository, DepartmentRepository, GroupRepository, PeopleRepository,
};
use crate::service::config_sync::ConfigSync;

pub struct CredentialService {
    credentials: Arc<CredentialRepository>,
    groups: Arc<GroupRepository>,
    sync: ConfigSync,
}

impl CredentialService {
    pub fn new(
        credentials: Arc<CredentialRepository>,
        groups: Arc<GroupRepository>,
        sync: ConfigSync,
    ) -> Self {
        Self {
            credentials,
            groups,
            sync,
        }
    }

    pub async fn create(&self, new: &NewCredential) -> Result<Credential> {
        let credential = self.credentials.create(new).await?;
        self.sync.data_sync();
        Ok(credential)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Credential> {
        self.credentials
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("凭证 {} 不存在", id)))
    }

    pub async fn find_all(&self) -> Result<Vec<Credential>> {
        self.credentials.find_all().await
    }

    pub async fn update(&self, id: i64, patch: &CredentialPatch) -> Result<Credential> {
        if patch.is_empty() {
            return self.find_by_id(id).await;
        }
        let credential = self.credentials.update(id, patch).await?;
        self.sync.data_sync();
        Ok(credential)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.credentials.delete(id).await?;
        self.sync.data_sync();
        Ok(())
    }

    pub async fn list_doors(&self, credential_id: i64) -> Result<Vec<Door>> {
        self.credentials.list_doors(credential_id).await
    }

    pub async fn update_door_access(
        &self,
        credential_id: i64,
        update: &DoorAccessUpdate,
    ) -> Result<Vec<Door>> {
        let doors = self
            .credentials
            .update_door_access(credential_id, &update.door_ids, update.sched_group_id)
            .await?;
        self.sync.data_sync();
        Ok(doors)
    }

    pub async fn assign_access_group(&self, credential_id: i64, access_group_id: i64) -> Result<()> {
        self.credentials
            .assign_access_group(credential_id, access_group_id)
            .await?;
        self.sync.data_sync();
        Ok(())
    }

    pub async fn all_doors(&self) -> Result<Vec<Door>> {
        self.credentials.all_doors().await
    }

    // ---- 分组 ----

    pub async fn create_door_group(&self, new: &NewDoorGroup) -> Result<DoorGroup> {
        let group = self.groups.create_door_group(new).await?;
        self.sync.data_sync();
        Ok(group)
    }

    pub async fn list_door_groups(&self) -> Result<Vec<DoorGroup>> {
        self.groups.list_door_groups().await
    }

    pub async fn create_sched_group(&self, new: &NewSchedGroup) -> Result<SchedGroup> {
        let group = self.groups.create_sched_group(new).await?;
        self.sync.data_sync();
        Ok(group)
    }

    pub async fn list_sched_groups(&self) -> Result<Vec<SchedGroup>> {
        self.groups.list_sched_groups().await
    }

    pub async fn create_access_group(&self, new: &NewAccessGroup) -> Result<AccessGroup> {
        let group = self.groups.create_access_group(new).await?;
        self.sync.data_sync();
        Ok(group)
    }

    pub async fn list_access_groups(&self) -> Result<Vec<AccessGroup>> {
        self.groups.list_access_groups().await
    }
}

pub struct PeopleService {
    people: Arc<PeopleRepository>,
    departments: Arc<DepartmentRepository>,
    credentials: Arc<CredentialRepository>,
    sync: ConfigSync,
}

impl PeopleService {
    pub fn new(
        people: Arc<PeopleRepository>,
        departments: Arc<DepartmentRepository>,
        credentials: Arc<CredentialRepository>,
        sync: ConfigSync,
    ) -> Self {
        Self {
            people,
            departments,
            credentials,
            sync,
        }
    }

    pub async fn create(&self, new: &NewPeople) -> Result<People> {
        let people = self.people.create(new).await?;
        self.sync.data_sync();
        Ok(people)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<People> {
        self.people
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("人员 {} 不存在", id)))
    }

    pub async fn find_all(&self) -> Result<Vec<People>> {
        self.people.find_all().await
    }

    pub async fn update(&self, id: i64, patch: &PeoplePatch) -> Result<People> {
        let people = self.people.update(id, patch).await?;
        self.sync.data_sync();
        Ok(people)
    }

    /// 删除人员，级联删除其凭证并回收凭证的专属门禁组
    pub async fn delete(&self, id: i64) -> Result<()> {
        let credential_ids = self.people.delete(id).await?;
        self.credentials.drop_dedicated_groups(&credential_ids).await?;
        self.sync.data_sync();
        Ok(())
    }

    pub async fn create_department(&self, new: &NewDepartment) -> Result<Department> {
        if new.name.trim().is_empty() {
            return Err(ServerError::Validation("部门名称不能为空".to_string()));
        }
        self.departments.create(new).await
    }

    pub async fn find_department(&self, id: i64) -> Result<Department> {
        self.departments
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("部门 {} 不存在", id)))
    }

    pub async fn find_all_departments(&self) -> Result<Vec<Department>> {
        self.departments.find_all().await
    }

    pub async fn delete_department(&self, id: i64) -> Result<()> {
        self.departments.delete(id).await?;
        self.sync.data_sync();
        Ok(())
    }
}
