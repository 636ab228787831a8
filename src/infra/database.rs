//! 数据库连接管理
//!
//! 控制器的数据分布在四个物理上独立的 SQLite 存储中，启动时构造一次 [`Stores`]，
//! 通过 `Arc` 传给各个 Repository。跨库引用一律按 id 显式查询，不依赖外键。

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;

// 编译时由 build.rs 扫描 migrations/<store>/ 生成
include!(concat!(env!("OUT_DIR"), "/migrations.rs"));

/// 四个独立存储的连接池
#[derive(Clone, Debug)]
pub struct Stores {
    /// 配置库：控制器用户、控制器属性、接口板、门
    pub config: SqlitePool,
    /// 凭证库：部门、人员、凭证、凭证门禁关联
    pub credential: SqlitePool,
    /// 分组库：门组、时间组、门禁组
    pub other_group: SqlitePool,
    /// 事件消息库
    pub event_message: SqlitePool,
}

impl Stores {
    /// 打开四个文件存储（不存在时创建）
    pub async fn open(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        Ok(Self {
            config: open_file_pool(&config.config_path).await?,
            credential: open_file_pool(&config.credential_path).await?,
            other_group: open_file_pool(&config.other_group_path).await?,
            event_message: open_file_pool(&config.event_message_path).await?,
        })
    }

    /// 创建四个互相隔离的内存存储，并应用表结构
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let stores = Self {
            config: open_memory_pool().await?,
            credential: open_memory_pool().await?,
            other_group: open_memory_pool().await?,
            event_message: open_memory_pool().await?,
        };
        stores.migrate().await?;
        Ok(stores)
    }

    /// 对四个存储分别应用尚未执行的迁移
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        apply_migrations(&self.config, "config", CONFIG_MIGRATIONS).await?;
        apply_migrations(&self.credential, "credential", CREDENTIAL_MIGRATIONS).await?;
        apply_migrations(&self.other_group, "other_group", OTHER_GROUP_MIGRATIONS).await?;
        apply_migrations(&self.event_message, "event_message", EVENT_MESSAGE_MIGRATIONS).await?;
        Ok(())
    }

    /// 将配置库的 WAL 刷入主数据文件
    pub async fn flush_config(&self) -> Result<(), sqlx::Error> {
        sqlx::query("PRAGMA wal_checkpoint(FULL)")
            .execute(&self.config)
            .await?;
        Ok(())
    }

    /// 关闭所有连接
    pub async fn close(&self) {
        self.config.close().await;
        self.credential.close().await;
        self.other_group.close().await;
        self.event_message.close().await;
    }
}

async fn open_file_pool(path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!("🔌 打开 SQLite 存储: {}", path);

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

async fn open_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    // 内存库随连接存在，只保留一个永不过期的连接
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

async fn apply_migrations(
    pool: &SqlitePool,
    store: &str,
    migrations: &[(&str, &str)],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ownsa_migrations (
            name       TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> = sqlx::query_scalar("SELECT name FROM ownsa_migrations")
        .fetch_all(pool)
        .await?;

    for (name, sql) in migrations {
        if applied.iter().any(|a| a == name) {
            debug!("⏭ [{}] {} 已执行，跳过", store, name);
            continue;
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO ownsa_migrations (name, applied_at) VALUES (?, ?)")
            .bind(*name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("✅ [{}] 迁移 {} 完成", store, name);
    }

    Ok(())
}

/// 删除四个存储文件及数据目录（恢复出厂时使用）
pub fn wipe_store_files(config: &DatabaseConfig) -> std::io::Result<()> {
    for path in [
        &config.config_path,
        &config.credential_path,
        &config.other_group_path,
        &config.event_message_path,
    ] {
        for suffix in ["", "-wal", "-shm"] {
            let file = format!("{}{}", path, suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => info!("🗑 已删除 {}", file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }

    if let Err(e) = std::fs::remove_dir(&config.data_dir) {
        warn!("删除数据目录失败 {}: {}", config.data_dir, e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_stores_are_isolated() {
        let stores = Stores::in_memory().await.unwrap();

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM controller_user")
            .fetch_one(&stores.config)
            .await
            .unwrap();
        assert_eq!(users, 0);

        // controller_user 只存在于配置库
        let missing = sqlx::query("SELECT COUNT(*) FROM controller_user")
            .fetch_one(&stores.credential)
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let stores = Stores::in_memory().await.unwrap();
        stores.migrate().await.unwrap();

        let props: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM controller_prop")
            .fetch_one(&stores.config)
            .await
            .unwrap();
        assert_eq!(props, 1);
    }

    #[tokio::test]
    async fn test_file_stores_open_and_wipe() {
        let dir = std::env::temp_dir().join(format!("ownsa-db-{}", uuid::Uuid::new_v4()));
        let config = DatabaseConfig {
            config_path: dir.join("config.db").display().to_string(),
            credential_path: dir.join("credential.db").display().to_string(),
            other_group_path: dir.join("other_group.db").display().to_string(),
            event_message_path: dir.join("event_message.db").display().to_string(),
            data_dir: dir.display().to_string(),
            factory_reset_marker: dir.join("reset").display().to_string(),
        };

        let stores = Stores::open(&config).await.unwrap();
        stores.migrate().await.unwrap();
        stores.flush_config().await.unwrap();
        stores.close().await;

        assert!(Path::new(&config.config_path).exists());
        wipe_store_files(&config).unwrap();
        assert!(!Path::new(&config.config_path).exists());
        assert!(!dir.exists());
    }
}
