use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 服务器监听地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
    /// 日志级别
    pub log_level: String,
    /// 数据库（四个独立存储）配置
    pub database: DatabaseConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// 设备后端配置
    pub device: DeviceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        // 部署在 ARM 控制器上时直接占用 80 端口
        let port = if cfg!(all(target_arch = "arm", target_os = "linux")) {
            80
        } else {
            8080
        };

        Self {
            host: "0.0.0.0".to_string(),
            port,
            log_level: "info".to_string(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl ServerConfig {
    /// 创建新的服务器配置
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;

        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).with_context(|| "配置文件格式错误")?;
        Ok(toml_config.into())
    }

    /// 从环境变量加载配置（OWNSA_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("OWNSA_HOST") {
            self.host = host;
        }
        if let Ok(port) = env::var("OWNSA_PORT") {
            self.port = port.parse().unwrap_or(self.port);
        }
        if let Ok(log_level) = env::var("OWNSA_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // 数据库路径
        if let Ok(path) = env::var("OWNSA_DB_CONFIG_PATH") {
            self.database.config_path = path;
        }
        if let Ok(path) = env::var("OWNSA_DB_CREDENTIAL_PATH") {
            self.database.credential_path = path;
        }
        if let Ok(path) = env::var("OWNSA_DB_OTHER_GROUP_PATH") {
            self.database.other_group_path = path;
        }
        if let Ok(path) = env::var("OWNSA_DB_EVENT_MESSAGE_PATH") {
            self.database.event_message_path = path;
        }

        // 认证
        if let Ok(secret) = env::var("OWNSA_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(ttl) = env::var("OWNSA_TOKEN_TTL_MINUTES") {
            self.auth.token_ttl_minutes = ttl.parse().unwrap_or(self.auth.token_ttl_minutes);
        }

        // 设备后端
        if let Ok(url) = env::var("OWNSA_BACKEND_BASE_URL") {
            self.device.backend_base_url = url;
        }
        if let Ok(timeout) = env::var("OWNSA_BACKEND_TIMEOUT_SECS") {
            self.device.request_timeout_secs =
                timeout.parse().unwrap_or(self.device.request_timeout_secs);
        }

        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(jwt_secret) = &cli.jwt_secret {
            self.auth.jwt_secret = jwt_secret.clone();
        }
        if let Some(url) = &cli.backend_url {
            self.device.backend_base_url = url.clone();
        }
        if let Some(log_level) = cli.get_log_level() {
            self.log_level = log_level;
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        // 1. 从配置文件加载（如果指定），否则使用默认值
        let mut config = if let Some(config_file) = &cli.config_file {
            if Path::new(config_file).exists() {
                info!("📄 从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            } else {
                tracing::warn!("⚠️ 配置文件不存在: {}", config_file);
                Self::new()
            }
        } else if Path::new("config.toml").exists() {
            info!("📄 从默认配置文件加载: config.toml");
            Self::from_toml_file("config.toml")?
        } else {
            Self::new()
        };

        // 2. 从环境变量合并（优先级高于配置文件）
        config.merge_from_env()?;

        // 3. 从命令行参数合并（最高优先级）
        config.merge_from_cli(cli);

        config.validate()?;
        Ok(config)
    }

    /// 基本校验
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            anyhow::bail!("auth.jwt_secret 不能为空");
        }
        if self.auth.token_ttl_minutes == 0 {
            anyhow::bail!("auth.token_ttl_minutes 必须大于 0");
        }
        url::Url::parse(&self.device.backend_base_url)
            .with_context(|| format!("device.backend_base_url 无效: {}", self.device.backend_base_url))?;
        Ok(())
    }
}

/// 四个独立 SQLite 存储的路径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 配置库（控制器用户、控制器属性、接口板、门）
    pub config_path: String,
    /// 凭证库（部门、人员、凭证、凭证门禁关联）
    pub credential_path: String,
    /// 分组库（门组、时间组、门禁组）
    pub other_group_path: String,
    /// 事件消息库
    pub event_message_path: String,
    /// 数据目录（不存在时启动会初始化数据库）
    pub data_dir: String,
    /// 恢复出厂标记文件，启动时存在则清空所有存储
    pub factory_reset_marker: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            config_path: "./appdata/db/config.db".to_string(),
            credential_path: "./appdata/db/credential.db".to_string(),
            other_group_path: "./appdata/db/other_group.db".to_string(),
            event_message_path: "./appdata/db/event_message.db".to_string(),
            data_dir: "./appdata/db".to_string(),
            factory_reset_marker: "./appdata/factory_reset".to_string(),
        }
    }
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT 签名密钥
    pub jwt_secret: String,
    /// token 有效期（分钟）
    pub token_ttl_minutes: u64,
    /// bcrypt 成本
    pub password_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-ownsa-secret".to_string(),
            token_ttl_minutes: 24 * 60,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// 设备后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// 设备后端基础 URL（以 / 结尾）
    pub backend_base_url: String,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 数据变更后是否通知设备后端同步
    pub sync_enabled: bool,
    /// 是否允许修改系统时钟 / 硬件时钟
    pub clock_sync_enabled: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://127.0.0.1:8000/".to_string(),
            request_timeout_secs: 10,
            sync_enabled: true,
            clock_sync_enabled: true,
        }
    }
}

impl DeviceConfig {
    /// 请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 启动早期读取的日志配置（完整配置加载之前）
#[derive(Debug, Default, Clone)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

/// 快速读取配置文件中的 [logging] 段，读取失败时返回空配置
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    let path = config_file.unwrap_or("config.toml");
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };

    #[derive(Deserialize)]
    struct LoggingOnly {
        logging: Option<TomlLoggingConfig>,
    }

    match toml::from_str::<LoggingOnly>(&content) {
        Ok(LoggingOnly { logging: Some(l) }) => EarlyLoggingConfig {
            level: l.level,
            format: l.format,
            file: l.file,
        },
        _ => EarlyLoggingConfig::default(),
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    server: Option<TomlServerConfig>,
    database: Option<TomlDatabaseConfig>,
    auth: Option<TomlAuthConfig>,
    device: Option<TomlDeviceConfig>,
    logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlServerConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct TomlDatabaseConfig {
    config_path: Option<String>,
    credential_path: Option<String>,
    other_group_path: Option<String>,
    event_message_path: Option<String>,
    data_dir: Option<String>,
    factory_reset_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlAuthConfig {
    jwt_secret: Option<String>,
    token_ttl_minutes: Option<u64>,
    password_cost: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlDeviceConfig {
    backend_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    sync_enabled: Option<bool>,
    clock_sync_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl From<TomlConfig> for ServerConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(server) = toml.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }

        if let Some(db) = toml.database {
            if let Some(p) = db.config_path {
                config.database.config_path = p;
            }
            if let Some(p) = db.credential_path {
                config.database.credential_path = p;
            }
            if let Some(p) = db.other_group_path {
                config.database.other_group_path = p;
            }
            if let Some(p) = db.event_message_path {
                config.database.event_message_path = p;
            }
            if let Some(p) = db.data_dir {
                config.database.data_dir = p;
            }
            if let Some(p) = db.factory_reset_marker {
                config.database.factory_reset_marker = p;
            }
        }

        if let Some(auth) = toml.auth {
            if let Some(secret) = auth.jwt_secret {
                config.auth.jwt_secret = secret;
            }
            if let Some(ttl) = auth.token_ttl_minutes {
                config.auth.token_ttl_minutes = ttl;
            }
            if let Some(cost) = auth.password_cost {
                config.auth.password_cost = cost;
            }
        }

        if let Some(device) = toml.device {
            if let Some(url) = device.backend_base_url {
                config.device.backend_base_url = url;
            }
            if let Some(timeout) = device.request_timeout_secs {
                config.device.request_timeout_secs = timeout;
            }
            if let Some(enabled) = device.sync_enabled {
                config.device.sync_enabled = enabled;
            }
            if let Some(enabled) = device.clock_sync_enabled {
                config.device.clock_sync_enabled = enabled;
            }
        }

        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.log_level = level;
            }
        }

        config
    }
}
