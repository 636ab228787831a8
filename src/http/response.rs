//! 统一响应信封 `{code, success, message, data}`
//!
//! 成功与失败都以 HTTP 200 返回，调用方通过 `success` 与 `code` 判断结果。

use crate::http::extract::Json;
use serde::{Deserialize, Serialize};

/// 响应信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 结果码（HTTP 状态码语义）
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: u16,
    /// 成功标志
    pub success: bool,
    /// 消息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn is_zero(code: &u16) -> bool {
    *code == 0
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    /// 无数据的成功响应
    pub fn empty() -> Self {
        Self {
            code: 200,
            success: true,
            message: None,
            data: None,
        }
    }
}

/// 包装成功响应
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

/// 无数据的成功响应
pub fn ok_empty() -> Json<ApiResponse<()>> {
    Json(ApiResponse::empty())
}
