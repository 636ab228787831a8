//! 服务器装配：打开存储、构造仓库与服务、启动 HTTP

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::auth::{JwtService, SessionStore};
use crate::config::{DatabaseConfig, ServerConfig};
use crate::error::{Result, ServerError};
use crate::http::{HttpServer, HttpServerState};
use crate::infra::{database, metrics, Stores};
use crate::repository::{
    ControllerUserRepository, CredentialRepository, DepartmentRepository, DeviceRepository,
    EventMessageRepository, GroupRepository, PeopleRepository,
};
use crate::service::{
    AccessResolver, ConfigSync, ControllerUserService, CredentialService, DeviceRelay,
    EventMessageService, OsClock, PeopleService, SystemClock,
};

/// `[device] clock_sync_enabled = false` 时使用：两个步骤都报告为未执行
struct DisabledClock;

#[async_trait]
impl SystemClock for DisabledClock {
    async fn set_system_time(&self, _datetime: &str) -> std::result::Result<(), String> {
        Err("clock sync disabled".to_string())
    }

    async fn write_hardware_clock(&self) -> std::result::Result<(), String> {
        Err("clock sync disabled".to_string())
    }
}

/// 根据已打开的存储构造全部服务
pub fn build_state(
    stores: Arc<Stores>,
    config: &ServerConfig,
    clock: Arc<dyn SystemClock>,
) -> Result<HttpServerState> {
    let users_repo = Arc::new(ControllerUserRepository::new(stores.clone()));
    let credential_repo = Arc::new(CredentialRepository::new(stores.clone()));
    let group_repo = Arc::new(GroupRepository::new(stores.clone()));
    let device_repo = Arc::new(DeviceRepository::new(stores.clone()));
    let people_repo = Arc::new(PeopleRepository::new(stores.clone()));
    let department_repo = Arc::new(DepartmentRepository::new(stores.clone()));
    let event_repo = Arc::new(EventMessageRepository::new(stores.clone()));

    let relay = Arc::new(DeviceRelay::new(&config.device, clock)?);
    let sync = ConfigSync::new(relay.clone(), config.device.sync_enabled);

    let sessions = Arc::new(SessionStore::new(
        JwtService::new(&config.auth.jwt_secret),
        users_repo.clone(),
    ));

    let users = Arc::new(ControllerUserService::new(
        users_repo,
        device_repo.clone(),
        sessions,
        stores,
        sync.clone(),
        config.auth.clone(),
        config.database.factory_reset_marker.clone(),
    ));
    let credentials = Arc::new(CredentialService::new(
        credential_repo.clone(),
        group_repo.clone(),
        sync.clone(),
    ));
    let people = Arc::new(PeopleService::new(
        people_repo,
        department_repo,
        credential_repo.clone(),
        sync.clone(),
    ));
    let resolver = Arc::new(AccessResolver::new(
        credential_repo,
        group_repo,
        device_repo.clone(),
    ));
    let events = Arc::new(EventMessageService::new(event_repo, relay.clone()));

    Ok(HttpServerState {
        users,
        credentials,
        people,
        resolver,
        relay,
        devices: device_repo,
        events,
        sync,
    })
}

/// 启动时检查恢复出厂标记：存在则删除全部存储文件与标记本身
pub fn apply_pending_factory_reset(config: &DatabaseConfig) -> Result<bool> {
    let marker = Path::new(&config.factory_reset_marker);
    if !marker.exists() {
        return Ok(false);
    }

    warn!("♻️ 检测到恢复出厂标记，清空全部存储");
    database::wipe_store_files(config)?;
    std::fs::remove_file(marker)?;
    Ok(true)
}

/// 控制器管理服务器
pub struct OwnsaServer {
    config: ServerConfig,
    stores: Arc<Stores>,
    state: HttpServerState,
}

impl OwnsaServer {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        if apply_pending_factory_reset(&config.database)? {
            info!("♻️ 恢复出厂完成");
        }

        let stores = Stores::open(&config.database)
            .await
            .map_err(|e| ServerError::Database(format!("打开存储失败: {}", e)))?;
        stores
            .migrate()
            .await
            .map_err(|e| ServerError::Database(format!("应用表结构失败: {}", e)))?;
        let stores = Arc::new(stores);

        if let Err(e) = metrics::init() {
            warn!("⚠️ 指标初始化失败: {}", e);
        }

        let clock: Arc<dyn SystemClock> = if config.device.clock_sync_enabled {
            Arc::new(OsClock)
        } else {
            Arc::new(DisabledClock)
        };
        let state = build_state(stores.clone(), &config, clock)?;

        Ok(Self {
            config,
            stores,
            state,
        })
    }

    pub fn state(&self) -> &HttpServerState {
        &self.state
    }

    /// 运行直到收到 Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let http = HttpServer::new(self.state.clone(), self.config.bind_address());

        http.start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("监听退出信号失败: {}", e);
            }
            info!("🛑 收到退出信号");
        })
        .await
        .map_err(|e| ServerError::Internal(format!("HTTP 服务器异常退出: {}", e)))?;

        self.stores.close().await;
        info!("👋 服务器已停止");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_reset_marker_wipes_stores() {
        let dir = std::env::temp_dir().join(format!("ownsa-reset-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = DatabaseConfig {
            config_path: dir.join("config.db").display().to_string(),
            credential_path: dir.join("credential.db").display().to_string(),
            other_group_path: dir.join("other_group.db").display().to_string(),
            event_message_path: dir.join("event_message.db").display().to_string(),
            data_dir: dir.display().to_string(),
            factory_reset_marker: std::env::temp_dir()
                .join(format!("ownsa-marker-{}", uuid::Uuid::new_v4()))
                .display()
                .to_string(),
        };

        assert!(!apply_pending_factory_reset(&config).unwrap());

        std::fs::write(&config.config_path, b"x").unwrap();
        std::fs::write(&config.factory_reset_marker, b"reset").unwrap();

        assert!(apply_pending_factory_reset(&config).unwrap());
        assert!(!Path::new(&config.config_path).exists());
        assert!(!Path::new(&config.factory_reset_marker).exists());
    }
}
