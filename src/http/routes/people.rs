//! 人员 `/api/people` 与部门 `/api/department` 路由

use axum::{extract::State, routing::get, Router};

use crate::error::Result;
use crate::http::extract::{Json, Path};
use crate::http::response::{ok, ok_empty, ApiResponse};
use crate::http::{AuthUser, HttpServerState};
use crate::model::controller_user::Permission;
use crate::model::people::{Department, NewDepartment, NewPeople, People, PeoplePatch};

pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/api/people", get(list_people).post(create_people))
        .route(
            "/api/people/{id}",
            get(get_people).patch(update_people).delete(delete_people),
        )
        .route("/api/department", get(list_departments).post(create_department))
        .route(
            "/api/department/{id}",
            get(get_department).delete(delete_department),
        )
}

async fn list_people(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<People>>>> {
    Ok(ok(state.people.find_all().await?))
}

async fn get_people(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<People>>> {
    Ok(ok(state.people.find_by_id(id).await?))
}

async fn create_people(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewPeople>,
) -> Result<Json<ApiResponse<People>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.people.create(&new).await?))
}

async fn update_people(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<PeoplePatch>,
) -> Result<Json<ApiResponse<People>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.people.update(id, &patch).await?))
}

async fn delete_people(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    state.people.delete(id).await?;
    Ok(ok_empty())
}

async fn list_departments(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Department>>>> {
    Ok(ok(state.people.find_all_departments().await?))
}

async fn get_department(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Department>>> {
    Ok(ok(state.people.find_department(id).await?))
}

async fn create_department(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Json(new): Json<NewDepartment>,
) -> Result<Json<ApiResponse<Department>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    Ok(ok(state.people.create_department(&new).await?))
}

async fn delete_department(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .users
        .authorize(auth.user_id, Permission::PeopleManagement)
        .await?;
    state.people.delete_department(id).await?;
    Ok(ok_empty())
}
