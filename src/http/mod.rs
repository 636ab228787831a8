//! HTTP 接口层 - 使用 Axum 提供控制器管理 API
//!
//! 所有应答（包括失败）都以 HTTP 200 返回统一信封 `{code, success, message, data}`。

pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use middleware::AuthUser;
pub use server::{build_router, HttpServer, HttpServerState};
