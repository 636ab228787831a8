//! 认证提取器
//!
//! token 取自 `Authorization` 请求头（可带 `Bearer ` 前缀），缺失时取 `X-Authorization` cookie。
//! 任何失败都以 `{code:401, success:false, message:"Unauthorized"}` 应答。

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use tracing::debug;

use crate::error::{AuthError, ServerError};
use crate::http::HttpServerState;

/// 回落使用的 cookie 名
pub const AUTH_COOKIE: &str = "X-Authorization";

/// 已通过会话校验的调用者
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

/// 从请求头或 cookie 中取出 token
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty());

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(AUTH_COOKIE)
            .map(|c| c.value().trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

impl FromRequestParts<HttpServerState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or_else(|| {
            debug!(path = %parts.uri.path(), "请求未携带 token");
            ServerError::Auth(AuthError::Malformed)
        })?;

        let user_id = state.users.sessions().verify_token(&token).await?;
        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_with_and_without_bearer_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc.def"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; X-Authorization=tok"));
        assert_eq!(extract_token(&headers).as_deref(), Some("tok"));

        // 请求头优先
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer hdr"));
        assert_eq!(extract_token(&headers).as_deref(), Some("hdr"));
    }

    #[test]
    fn test_missing_token() {
        assert!(extract_token(&HeaderMap::new()).is_none());
    }
}
