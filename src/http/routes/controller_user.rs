//! 控制器用户路由 `/api/controllerUser`

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Router,
};

use crate::error::Result;
use crate::http::extract::{Json, Path};
use crate::http::response::{ok, ok_empty, ApiResponse};
use crate::http::middleware::auth::extract_token;
use crate::http::{AuthUser, HttpServerState};
use crate::model::controller_user::{
    ChangePasswordRequest, ControllerUser, ControllerUserPatch, LoginRequest, LoginResponse,
    Permission, RegisterRequest,
};

pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/api/controllerUser/login", post(login))
        .route(
            "/api/controllerUser",
            post(register).get(list_users).patch(change_password),
        )
        .route("/api/controllerUser/logout", get(logout))
        .route("/api/controllerUser/tokenVerify", get(token_verify))
        .route(
            "/api/controllerUser/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

async fn login(
    State(state): State<HttpServerState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    Ok(ok(state.users.login(&req).await?))
}

/// 未携带 token 时为公开注册（普通用户、无权限位）；
/// 携带 token 时按管理员创建处理，需要系统设置权限
async fn register(
    State(state): State<HttpServerState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<ControllerUser>>> {
    let user = match extract_token(&headers) {
        Some(token) => {
            let caller_id = state.users.sessions().verify_token(&token).await?;
            state.users.create_user(caller_id, &req).await?
        }
        None => state.users.register(&req).await?,
    };
    Ok(ok(user))
}

async fn logout(
    State(state): State<HttpServerState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<()>>> {
    state.users.logout(auth.user_id).await?;
    Ok(ok_empty())
}

async fn token_verify(
    State(state): State<HttpServerState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<ControllerUser>>> {
    Ok(ok(state.users.find_by_id(auth.user_id).await?))
}

async fn change_password(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>> {
    state.users.change_password(auth.user_id, &req).await?;
    Ok(ok_empty())
}

async fn list_users(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<ControllerUser>>>> {
    Ok(ok(state.users.find_all().await?))
}

async fn get_user(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ControllerUser>>> {
    Ok(ok(state.users.find_by_id(id).await?))
}

async fn update_user(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<ControllerUserPatch>,
) -> Result<Json<ApiResponse<ControllerUser>>> {
    state
        .users
        .authorize(auth.user_id, Permission::SystemSettings)
        .await?;
    Ok(ok(state.users.update(id, &patch).await?))
}

async fn delete_user(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .users
        .authorize(auth.user_id, Permission::SystemSettings)
        .await?;
    state.users.delete(auth.user_id, id).await?;
    Ok(ok_empty())
}
