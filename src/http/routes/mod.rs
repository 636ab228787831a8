//! HTTP 路由模块
//!
//! 路由结构：
//! - `/api/controllerUser/*` - 登录、登出、账号管理
//! - `/api/credential/*`     - 凭证、凭证门禁、门禁判定
//! - `/api/people/*`、`/api/department/*` - 人员与部门
//! - `/api/group/*`          - 门组、时间组、门禁组
//! - `/api/device/*`         - 控制器属性、接口板、门、设备指令
//! - `/api/event/*`          - 事件查询、同步与推送
//! - `/metrics`              - Prometheus 抓取端点

pub mod controller_user;
pub mod credential;
pub mod device;
pub mod event;
pub mod group;
pub mod metrics;
pub mod people;

use crate::http::HttpServerState;
use axum::{routing::get, Router};

/// 创建所有路由
pub fn create_routes() -> Router<HttpServerState> {
    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .merge(controller_user::create_route())
        .merge(credential::create_route())
        .merge(people::create_route())
        .merge(group::create_route())
        .merge(device::create_route())
        .merge(event::create_route())
}
