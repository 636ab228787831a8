use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, Result, ServerError};

/// 会话 token 的声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// 用户 ID（字符串形式）
    pub id: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
    /// 同一秒内的两次登录也得到不同的 token
    pub jti: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> std::result::Result<i64, AuthError> {
        self.id.parse().map_err(|_| AuthError::Malformed)
    }
}

/// JWT 签发和验证服务 (HS256)
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// 签发 token
    pub fn issue(&self, user_id: i64, username: &str, ttl_minutes: u64) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            id: user_id.to_string(),
            username: username.to_string(),
            exp: now + (ttl_minutes as i64) * 60,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServerError::Internal(format!("JWT 签发失败: {}", e)))
    }

    /// 校验签名与有效期；过期归为 `ExpiredOrSuperseded`，其余失败归为 `Malformed`
    pub fn decode(&self, token: &str) -> std::result::Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredOrSuperseded,
                _ => AuthError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_issue_and_decode() {
        let jwt = JwtService::new("test-secret");
        let token = jwt.issue(42, "admin", 60).unwrap();

        let claims = jwt.decode(&token).unwrap();
        assert_eq!(claims.id, "42");
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.user_id().unwrap(), 42);
    }

    #[test]
    fn test_same_second_tokens_differ() {
        let jwt = JwtService::new("test-secret");
        let a = jwt.issue(1, "admin", 60).unwrap();
        let b = jwt.issue(1, "admin", 60).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_is_malformed() {
        let token = JwtService::new("secret-a").issue(1, "admin", 60).unwrap();
        let err = JwtService::new("secret-b").decode(&token).unwrap_err();
        assert_eq!(err, AuthError::Malformed);
        assert_eq!(
            JwtService::new("secret-a").decode("not-a-jwt").unwrap_err(),
            AuthError::Malformed
        );
    }

    #[test]
    fn test_expired_token_is_expired_or_superseded() {
        let jwt = JwtService::new("test-secret");
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            id: "1".to_string(),
            username: "admin".to_string(),
            exp: now - 10,
            iat: now - 100,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &jwt.encoding_key).unwrap();
        assert_eq!(jwt.decode(&token).unwrap_err(), AuthError::ExpiredOrSuperseded);
    }
}
