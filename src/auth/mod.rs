// 认证模块 - 会话 token 的签发、校验与吊销，以及密码哈希

pub mod jwt_service;
pub mod password;
pub mod session_store;

pub use crate::error::AuthError;
pub use jwt_service::{JwtService, SessionClaims};
pub use password::{hash_password, verify_password};
pub use session_store::SessionStore;
