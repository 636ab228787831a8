//! 设备拓扑与控制器属性仓库（config 库）

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Result, ServerError};
use crate::infra::Stores;
use crate::model::device::{
    ControllerProp, InterfaceBoard, InterfaceBoardPatch, InterfaceBoardType, NewInterfaceBoard,
};
use crate::model::group::{Door, NewDoor};

#[derive(sqlx::FromRow)]
struct InterfaceBoardRow {
    id: i64,
    ib_type: i64,
    ib_addr: i64,
    name: String,
    enabled: bool,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<InterfaceBoardRow> for InterfaceBoard {
    type Error = ServerError;

    fn try_from(r: InterfaceBoardRow) -> Result<Self> {
        Ok(InterfaceBoard {
            id: r.id,
            ib_type: InterfaceBoardType::try_from(r.ib_type).map_err(ServerError::Database)?,
            ib_addr: r.ib_addr,
            name: r.name,
            enabled: r.enabled,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const SELECT_BOARD: &str =
    "SELECT id, ib_type, ib_addr, name, enabled, created_at, updated_at FROM interface_board";
const SELECT_DOOR: &str = "SELECT id, interface_board_id, ib_addr, output_addr, name FROM door";

#[derive(Clone)]
pub struct DeviceRepository {
    stores: Arc<Stores>,
}

impl DeviceRepository {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self { stores }
    }

    // ---- 控制器属性 ----

    pub async fn find_prop(&self) -> Result<ControllerProp> {
        let prop = sqlx::query_as::<_, ControllerProp>(
            "SELECT controller_name, bp_type, product_type, is_double_line, is_ownsa, is_bak_ctl, updated_at
             FROM controller_prop WHERE id = 1",
        )
        .fetch_one(&self.stores.config)
        .await
        .map_err(|e| ServerError::Database(format!("读取控制器属性失败: {}", e)))?;
        Ok(prop)
    }

    pub async fn update_prop(&self, prop: &ControllerProp) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE controller_prop
            SET controller_name = ?, bp_type = ?, product_type = ?,
                is_double_line = ?, is_ownsa = ?, is_bak_ctl = ?, updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(&prop.controller_name)
        .bind(prop.bp_type)
        .bind(prop.product_type)
        .bind(prop.is_double_line)
        .bind(prop.is_ownsa)
        .bind(prop.is_bak_ctl)
        .bind(prop.updated_at)
        .execute(&self.stores.config)
        .await
        .map_err(|e| ServerError::Database(format!("更新控制器属性失败: {}", e)))?;
        Ok(())
    }

    // ---- 接口板 ----

    pub async fn create_board(&self, new: &NewInterfaceBoard) -> Result<InterfaceBoard> {
        let now = Utc::now().timestamp();
        let id = sqlx::query(
            "INSERT INTO interface_board (ib_type, ib_addr, name, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(i64::from(new.ib_type))
        .bind(new.ib_addr)
        .bind(&new.name)
        .bind(new.enabled.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(&self.stores.config)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ServerError::Validation(format!("接口板地址 {} 已被占用", new.ib_addr))
            }
            other => ServerError::Database(format!("创建接口板失败: {}", other)),
        })?
        .last_insert_rowid();

        self.find_board(id)
            .await?
            .ok_or_else(|| ServerError::Internal(format!("新建接口板 {} 读取失败", id)))
    }

    pub async fn find_board(&self, id: i64) -> Result<Option<InterfaceBoard>> {
        let row = sqlx::query_as::<_, InterfaceBoardRow>(&format!("{SELECT_BOARD} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.stores.config)
            .await?;
        row.map(InterfaceBoard::try_from).transpose()
    }

    pub async fn list_boards(&self) -> Result<Vec<InterfaceBoard>> {
        let rows = sqlx::query_as::<_, InterfaceBoardRow>(&format!("{SELECT_BOARD} ORDER BY ib_addr"))
            .fetch_all(&self.stores.config)
            .await?;
        rows.into_iter().map(InterfaceBoard::try_from).collect()
    }

    pub async fn update_board(&self, id: i64, patch: &InterfaceBoardPatch) -> Result<InterfaceBoard> {
        let mut board = self
            .find_board(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("接口板 {} 不存在", id)))?;

        if let Some(name) = &patch.name {
            board.name = name.clone();
        }
        if let Some(enabled) = patch.enabled {
            board.enabled = enabled;
        }
        board.updated_at = Utc::now().timestamp();

        sqlx::query("UPDATE interface_board SET name = ?, enabled = ?, updated_at = ? WHERE id = ?")
            .bind(&board.name)
            .bind(board.enabled)
            .bind(board.updated_at)
            .bind(id)
            .execute(&self.stores.config)
            .await?;

        Ok(board)
    }

    /// 删除接口板及其上的门
    pub async fn delete_board(&self, id: i64) -> Result<()> {
        let mut tx = self.stores.config.begin().await?;
        sqlx::query("DELETE FROM door WHERE interface_board_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM interface_board WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ServerError::NotFound(format!("接口板 {} 不存在", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- 门 ----

    pub async fn create_door(&self, new: &NewDoor) -> Result<Door> {
        let board = self
            .find_board(new.interface_board_id)
            .await?
            .ok_or_else(|| {
                ServerError::Validation(format!("接口板 {} 不存在", new.interface_board_id))
            })?;

        let id = sqlx::query(
            "INSERT INTO door (interface_board_id, ib_addr, output_addr, name) VALUES (?, ?, ?, ?)",
        )
        .bind(board.id)
        .bind(board.ib_addr)
        .bind(new.output_addr)
        .bind(&new.name)
        .execute(&self.stores.config)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => ServerError::Validation(
                format!("门地址 {}:{} 已存在", board.ib_addr, new.output_addr),
            ),
            other => ServerError::Database(format!("创建门失败: {}", other)),
        })?
        .last_insert_rowid();

        Ok(Door {
            id,
            interface_board_id: board.id,
            ib_addr: board.ib_addr,
            output_addr: new.output_addr,
            name: new.name.clone(),
        })
    }

    pub async fn find_door(&self, id: i64) -> Result<Option<Door>> {
        let door = sqlx::query_as::<_, Door>(&format!("{SELECT_DOOR} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.stores.config)
            .await?;
        Ok(door)
    }

    /// 按硬件地址 (ib_addr, output_addr) 查找门
    pub async fn find_door_by_address(&self, ib_addr: i64, output_addr: i64) -> Result<Option<Door>> {
        let door = sqlx::query_as::<_, Door>(&format!(
            "{SELECT_DOOR} WHERE ib_addr = ? AND output_addr = ?"
        ))
        .bind(ib_addr)
        .bind(output_addr)
        .fetch_optional(&self.stores.config)
        .await?;
        Ok(door)
    }

    pub async fn delete_door(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM door WHERE id = ?")
            .bind(id)
            .execute(&self.stores.config)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound(format!("门 {} 不存在", id)));
        }
        Ok(())
    }
}
