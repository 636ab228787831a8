use std::error::Error as StdError;
use std::fmt;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use rand::{distributions::Alphanumeric, Rng};
use tracing::error;

use crate::http::response::ApiResponse;

/// 认证错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// token 无法解析或签名不正确
    #[error("malformed token")]
    Malformed,
    /// token 已过期，或已被登出 / 其它登录顶替
    #[error("token expired or logged in from another device")]
    ExpiredOrSuperseded,
    /// token 中的用户不存在
    #[error("user not found")]
    UserNotFound,
    /// 用户名或密码错误（两种情况对外不区分）
    #[error("invalid username or password")]
    InvalidCredentials,
}

/// 服务器错误类型
#[derive(Debug, Clone)]
pub enum ServerError {
    /// 请求参数错误或引用的记录不存在（调用方的问题）
    Validation(String),
    /// 认证错误
    Auth(AuthError),
    /// 权限不足
    PermissionDenied(String),
    /// 记录未找到
    NotFound(String),
    /// 设备后端不可达（超时、连接失败、非 2xx）
    DeviceUnreachable(String),
    /// 设备后端应答无法解析
    DeviceProtocol(String),
    /// 数据库错误
    Database(String),
    /// 配置错误
    Configuration(String),
    /// 内部错误
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ServerError::Auth(err) => write!(f, "Authentication error: {}", err),
            ServerError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            ServerError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ServerError::DeviceUnreachable(msg) => write!(f, "Device unreachable: {}", msg),
            ServerError::DeviceProtocol(msg) => write!(f, "Device protocol error: {}", msg),
            ServerError::Database(msg) => write!(f, "Database error: {}", msg),
            ServerError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for ServerError {}

impl ServerError {
    /// 响应信封中的 code（HTTP 状态码语义，但 HTTP 层始终返回 200）
    pub fn code(&self) -> u16 {
        match self {
            ServerError::Validation(_) => 400,
            // 登录失败沿用旧接口的 404
            ServerError::Auth(AuthError::InvalidCredentials) => 404,
            ServerError::Auth(_) => 401,
            ServerError::PermissionDenied(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::DeviceProtocol(_) => 502,
            ServerError::DeviceUnreachable(_) => 503,
            ServerError::Database(_) | ServerError::Configuration(_) | ServerError::Internal(_) => 500,
        }
    }

    /// 对外展示的消息
    pub fn public_message(&self) -> String {
        match self {
            ServerError::Auth(AuthError::InvalidCredentials) => AuthError::InvalidCredentials.to_string(),
            ServerError::Auth(_) => "Unauthorized".to_string(),
            other => other.to_string(),
        }
    }

    /// 是否属于服务端异常（需要附带追踪标识）
    pub fn is_internal(&self) -> bool {
        self.code() == 500
    }
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        ServerError::Auth(err)
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServerError::NotFound("record not found".to_string()),
            other => ServerError::Database(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServerError::DeviceProtocol(err.to_string())
        } else {
            // 超时、连接失败、状态码错误都归为不可达，由调用方决定是否重试
            ServerError::DeviceUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::DeviceProtocol(err.to_string())
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::Validation(rejection.body_text())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let mut body = ApiResponse::<String>::failure(self.code(), self.public_message());

        if self.is_internal() {
            let trace_id = correlation_token();
            error!(trace_id = %trace_id, "❌ 请求处理失败: {}", self);
            body.data = Some(trace_id);
        } else {
            tracing::debug!("请求失败: {}", self);
        }

        // 所有失败都以 HTTP 200 + 信封返回
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// 生成 8 位随机追踪标识，附在 500 类响应中便于排查
pub fn correlation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
