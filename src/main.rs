use std::fs;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use ownsa_server::{
    build_state,
    cli::{Cli, Commands},
    config::{self, ServerConfig},
    logging,
    service::OsClock,
    OwnsaServer, Stores,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 处理子命令
    if let Some(command) = &cli.command {
        match command {
            Commands::Migrate {
                admin_user,
                admin_password,
            } => {
                return run_migrate(&cli, admin_user.as_deref(), admin_password.as_deref()).await;
            }
            Commands::GenerateConfig { path } => {
                return generate_config(path);
            }
            Commands::ValidateConfig { path } => {
                return validate_config(path);
            }
            Commands::ShowConfig => {
                return show_config(&cli);
            }
        }
    }

    // 快速读取 config.toml 的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > config.toml > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.clone().or(early_log.file);

    // 文件日志的后台写线程随 guard 存活
    let _log_guard =
        logging::init_logging(&log_level, log_format.as_deref(), log_file.as_deref(), cli.quiet)?;

    tracing::info!("🚀 OWNSA Server starting...");

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = ServerConfig::load(&cli).context("加载配置失败")?;

    if cli.dev {
        tracing::info!("🔧 开发模式已启用");
    }

    tracing::info!("📊 Server Configuration:");
    tracing::info!("  - Bind: {}", config.bind_address());
    tracing::info!("  - Config DB: {}", config.database.config_path);
    tracing::info!("  - Credential DB: {}", config.database.credential_path);
    tracing::info!("  - Other Group DB: {}", config.database.other_group_path);
    tracing::info!("  - Event Message DB: {}", config.database.event_message_path);
    tracing::info!("  - Device Backend: {}", config.device.backend_base_url);
    tracing::info!("  - Device Timeout: {}s", config.device.request_timeout_secs);
    tracing::info!("  - Log Level: {}", config.log_level);
    if let Some(f) = &log_file {
        tracing::info!("  - Log File: {}", f);
    }

    let server = match OwnsaServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("❌ 服务器初始化失败: {}", e);
            tracing::error!("💡 请检查配置与数据目录后重试");
            process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!("❌ 服务器运行失败: {}", e);
        process::exit(1);
    }

    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# OWNSA Server 配置文件
# 此文件由 ownsa-server generate-config 生成

[server]
host = "0.0.0.0"
port = 8080

[database]
config_path = "./appdata/db/config.db"
credential_path = "./appdata/db/credential.db"
other_group_path = "./appdata/db/other_group.db"
event_message_path = "./appdata/db/event_message.db"
data_dir = "./appdata/db"
factory_reset_marker = "./appdata/factory_reset"

[auth]
jwt_secret = "change-me-ownsa-secret"
token_ttl_minutes = 1440
password_cost = 12

[device]
backend_base_url = "http://127.0.0.1:8000/"
request_timeout_secs = 10
sync_enabled = true
clock_sync_enabled = true

[logging]
level = "info"
format = "compact"
# file = "./logs/server.log"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = ServerConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config.validate()?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - Bind: {}", config.bind_address());
    println!("  - Data Dir: {}", config.database.data_dir);
    println!("  - Device Backend: {}", config.device.backend_base_url);

    Ok(())
}

/// 在四个存储上应用表结构，并在没有任何用户时创建初始管理员
async fn run_migrate(
    cli: &Cli,
    admin_user: Option<&str>,
    admin_password: Option<&str>,
) -> Result<()> {
    logging::init_logging("info", None, None, cli.quiet)?;

    let config = ServerConfig::load(cli).context("加载配置失败")?;

    println!("🔌 打开存储...");
    let stores = Stores::open(&config.database)
        .await
        .context("打开存储失败，请检查 [database] 路径")?;
    stores.migrate().await.context("应用表结构失败")?;
    println!("✅ 表结构已是最新");

    if let (Some(user), Some(password)) = (admin_user, admin_password) {
        let stores = Arc::new(stores.clone());
        let state = build_state(stores, &config, Arc::new(OsClock))?;
        match state.users.seed_admin(user, password).await? {
            Some(admin) => println!("👤 已创建管理员 {} (id={})", admin.username, admin.id),
            None => println!("⏭ 已存在用户，跳过管理员创建"),
        }
    }

    stores.close().await;
    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    // 初始化基本日志（用于显示配置）
    logging::init_logging("info", None, None, false)?;

    let config = ServerConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
