/// 密码加密和验证模块
///
/// 使用 bcrypt 算法进行密码加密，成本值来自 `[auth] password_cost`

use bcrypt::{hash, verify};

use crate::error::{Result, ServerError};

/// 加密密码
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    hash(password, cost).map_err(|e| ServerError::Internal(format!("密码加密失败: {}", e)))
}

/// 验证密码
///
/// 哈希格式损坏时返回 `Ok(false)`，与密码错误同等对待
pub fn verify_password(password: &str, hash: &str) -> bool {
    match verify(password, hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!("密码哈希无法解析: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    #[test]
    fn test_verify_password_correct() {
        let hash = hash_password("secret123", COST).unwrap();
        assert!(verify_password("secret123", &hash));
        assert!(!verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_same_password_different_hash() {
        let hash1 = hash_password("secret123", COST).unwrap();
        let hash2 = hash_password("secret123", COST).unwrap();

        // salt 不同
        assert_ne!(hash1, hash2);
        assert!(verify_password("secret123", &hash1));
        assert!(verify_password("secret123", &hash2));
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_password("secret123", "plain-text"));
    }

    #[test]
    fn test_hash_shape() {
        let hash = hash_password("x", COST).unwrap();
        assert_eq!(hash.len(), 60);
        assert!(hash.starts_with("$2b$"));
    }
}
