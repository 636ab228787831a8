//! 凭证路由 `/api/credential`

use axum::{
    extract::State,
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Result, ServerError};
use crate::http::extract::{Json, Path, Query};
use crate::http::response::{ok, ok_empty, ApiResponse};
use crate::http::{AuthUser, HttpServerState};
use crate::model::controller_user::Permission;
use crate::model::credential::{Credential, CredentialPatch, DoorAccessUpdate, NewCredential};
use crate::model::group::{AssignAccessGroup, Door};
use crate::service::AccessCheck;

pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/api/credential", get(list_credentials).post(create_credential))
        .route("/api/credential/alldoor", get(all_doors))
        .route("/api/credential/door/{id}", get(list_doors).patch(update_door_access))
        .route("/api/credential/access/{id}", get(check_access))
        .route("/api/credential/accessGroup/{id}", put(assign_access_group))
        .route(
            "/api/credential/{id}",
            get(get_credential)
                .patch(update_credential)
                .delete(delete_credential),
        )
}

async fn list_credentials(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Credential>>>> {
    Ok(ok(state.credentials.find_all().await?))
}

async fn get_credential(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Credential>>> {
    Ok(ok(state.credentials.find_by_id(id).await?))
}

async fn create_credential(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewCredential>,
) -> Result<Json<ApiResponse<Credential>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.credentials.create(&new).await?))
}

async fn update_credential(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<CredentialPatch>,
) -> Result<Json<ApiResponse<Credential>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.credentials.update(id, &patch).await?))
}

async fn delete_credential(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    state.credentials.delete(id).await?;
    Ok(ok_empty())
}

async fn all_doors(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Door>>>> {
    Ok(ok(state.credentials.all_doors().await?))
}

async fn list_doors(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Door>>>> {
    Ok(ok(state.credentials.list_doors(id).await?))
}

async fn update_door_access(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<DoorAccessUpdate>,
) -> Result<Json<ApiResponse<Vec<Door>>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.credentials.update_door_access(id, &update).await?))
}

async fn assign_access_group(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<AssignAccessGroup>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    state
        .credentials
        .assign_access_group(id, req.access_group_id)
        .await?;
    Ok(ok_empty())
}

/// 判定查询：给出 `door`（门 ID）或 `ibaddr` + `outputaddr`；`at` 为 Unix 秒，缺省为当前时间
#[derive(Debug, Deserialize)]
struct AccessQuery {
    door: Option<i64>,
    ibaddr: Option<i64>,
    outputaddr: Option<i64>,
    at: Option<i64>,
}

async fn check_access(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<ApiResponse<AccessCheck>>> {
    let at = match query.at {
        Some(ts) => DateTime::<Utc>::from_timestamp(ts, 0)
            .ok_or_else(|| ServerError::Validation(format!("无效的时间戳: {}", ts)))?,
        None => Utc::now(),
    };

    let check = match (query.door, query.ibaddr, query.outputaddr) {
        (Some(door), _, _) => state.resolver.check_access(id, door, at).await?,
        (None, Some(ib), Some(out)) => {
            state
                .resolver
                .check_access_at_address(id, ib, out, at)
                .await?
        }
        _ => {
            return Err(ServerError::Validation(
                "需要 door 或 ibaddr + outputaddr".to_string(),
            ))
        }
    };
    Ok(ok(check))
}
