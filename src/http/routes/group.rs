//! 门组、时间组、门禁组路由 `/api/group`

use axum::{extract::State, routing::get, Router};

use crate::error::Result;
use crate::http::extract::Json;
use crate::http::response::{ok, ApiResponse};
use crate::http::{AuthUser, HttpServerState};
use crate::model::controller_user::Permission;
use crate::model::group::{
    AccessGroup, DoorGroup, NewAccessGroup, NewDoorGroup, NewSchedGroup, SchedGroup,
};

pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/api/group/door", get(list_door_groups).post(create_door_group))
        .route("/api/group/sched", get(list_sched_groups).post(create_sched_group))
        .route("/api/group/access", get(list_access_groups).post(create_access_group))
}

async fn list_door_groups(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<DoorGroup>>>> {
    Ok(ok(state.credentials.list_door_groups().await?))
}

async fn create_door_group(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewDoorGroup>,
) -> Result<Json<ApiResponse<DoorGroup>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.credentials.create_door_group(&new).await?))
}

async fn list_sched_groups(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<SchedGroup>>>> {
    Ok(ok(state.credentials.list_sched_groups().await?))
}

async fn create_sched_group(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewSchedGroup>,
) -> Result<Json<ApiResponse<SchedGroup>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.credentials.create_sched_group(&new).await?))
}

async fn list_access_groups(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<AccessGroup>>>> {
    Ok(ok(state.credentials.list_access_groups().await?))
}

async fn create_access_group(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewAccessGroup>,
) -> Result<Json<ApiResponse<AccessGroup>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.credentials.create_access_group(&new).await?))
}
