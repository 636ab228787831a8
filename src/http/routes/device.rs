//! 设备路由 `/api/device`
//!
//! 开门、消防复位、校时与状态同步转发给设备后端；接口板与门的配置保存在 config 库。

use axum::{
    extract::State,
    routing::{delete, get, post},
    Router,
};
use serde_json::Value;

use crate::error::{Result, ServerError};
use crate::http::extract::{Json, Path};
use crate::http::response::{ok, ok_empty, ApiResponse};
use crate::http::{AuthUser, HttpServerState};
use crate::model::controller_user::Permission;
use crate::model::device::{
    ControllerProp, ControllerPropPatch, DoorOpenRequest, DoorOpenResult, FactorySetting,
    FireCancelRequest, FireCancelResult, InterfaceBoard, InterfaceBoardPatch, NewInterfaceBoard,
    TimeSyncRequest, TimeSyncResult,
};
use crate::model::group::{Door, NewDoor};

pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/api/device/factorySet", get(get_factory_set).post(factory_set))
        .route("/api/device/factoryReset", post(factory_reset))
        .route("/api/device/controller", get(get_controller).post(update_controller))
        .route("/api/device/interfaceBoard", get(list_boards).post(create_board))
        .route(
            "/api/device/interfaceBoard/{id}",
            get(get_board).patch(update_board).delete(delete_board),
        )
        .route("/api/device/door", get(list_doors).post(create_door))
        .route("/api/device/door/{id}", delete(delete_door))
        .route("/api/device/statusSync", get(status_sync))
        .route("/api/device/doorOpen", post(door_open))
        .route("/api/device/fireCancel", post(fire_cancel))
        .route("/api/device/timeSync", post(time_sync))
}

// ---- 工厂设置 ----

/// 公开接口，无需登录
async fn get_factory_set(
    State(state): State<HttpServerState>,
) -> Result<Json<ApiResponse<FactorySetting>>> {
    Ok(ok(state.users.get_factory_set().await?))
}

async fn factory_set(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(setting): Json<FactorySetting>,
) -> Result<Json<ApiResponse<FactorySetting>>> {
    Ok(ok(state.users.factory_set(auth.user_id, &setting).await?))
}

async fn factory_reset(
    State(state): State<HttpServerState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<()>>> {
    state.users.factory_reset(auth.user_id).await?;
    Ok(ok_empty())
}

// ---- 控制器属性 ----

async fn get_controller(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<ControllerProp>>> {
    Ok(ok(state.users.find_controller_prop().await?))
}

async fn update_controller(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(patch): Json<ControllerPropPatch>,
) -> Result<Json<ApiResponse<ControllerProp>>> {
    Ok(ok(state
        .users
        .update_controller_prop(auth.user_id, &patch)
        .await?))
}

// ---- 接口板与门 ----

async fn list_boards(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<InterfaceBoard>>>> {
    Ok(ok(state.devices.list_boards().await?))
}

async fn get_board(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<InterfaceBoard>>> {
    let board = state
        .devices
        .find_board(id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("接口板 {} 不存在", id)))?;
    Ok(ok(board))
}

async fn create_board(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewInterfaceBoard>,
) -> Result<Json<ApiResponse<InterfaceBoard>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceManagement)
        .await?;
    let board = state.devices.create_board(&new).await?;
    state.sync.data_sync();
    Ok(ok(board))
}

async fn update_board(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<InterfaceBoardPatch>,
) -> Result<Json<ApiResponse<InterfaceBoard>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceManagement)
        .await?;
    let board = state.devices.update_board(id, &patch).await?;
    state.sync.data_sync();
    Ok(ok(board))
}

async fn delete_board(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceManagement)
        .await?;
    state.devices.delete_board(id).await?;
    state.sync.data_sync();
    Ok(ok_empty())
}

async fn list_doors(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Door>>>> {
    Ok(ok(state.credentials.all_doors().await?))
}

async fn create_door(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewDoor>,
) -> Result<Json<ApiResponse<Door>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceManagement)
        .await?;
    let door = state.devices.create_door(&new).await?;
    state.sync.data_sync();
    Ok(ok(door))
}

async fn delete_door(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceManagement)
        .await?;
    state.devices.delete_door(id).await?;
    state.sync.data_sync();
    Ok(ok_empty())
}

// ---- 设备指令 ----

async fn status_sync(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Value>>> {
    Ok(ok(state.relay.status_sync().await?))
}

async fn door_open(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(req): Json<DoorOpenRequest>,
) -> Result<Json<ApiResponse<DoorOpenResult>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceMaintenance)
        .await?;
    Ok(ok(state
        .relay
        .open_door(req.ibaddr, req.outputaddr, req.mode)
        .await?))
}

async fn fire_cancel(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(req): Json<FireCancelRequest>,
) -> Result<Json<ApiResponse<FireCancelResult>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceMaintenance)
        .await?;
    Ok(ok(state.relay.cancel_fire_alarm(req.ibaddr).await?))
}

async fn time_sync(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(req): Json<TimeSyncRequest>,
) -> Result<Json<ApiResponse<TimeSyncResult>>> {
    state
        .users
        .authorize(auth.user_id, Permission::DeviceMaintenance)
        .await?;
    Ok(ok(state.relay.sync_device_time(&req.datetime).await?))
}
