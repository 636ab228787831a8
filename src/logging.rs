use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// 指定 `log_file` 时日志按天滚动写入文件，返回的 guard 必须在进程生命周期内持有。
pub fn init_logging(
    log_level: &str,
    log_format: Option<&str>,
    log_file: Option<&str>,
    quiet: bool,
) -> Result<Option<WorkerGuard>> {
    // 如果静默模式，只输出错误
    let level = if quiet { "error" } else { log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(file) = log_file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let prefix = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "ownsa.log".to_string());

        let appender = tracing_appender::rolling::daily(dir, prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        match log_format {
            Some("json") => tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.json())
                .try_init()?,
            _ => tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.compact())
                .try_init()?,
        }

        return Ok(Some(guard));
    }

    match log_format {
        Some("json") => {
            // JSON 格式（适合生产环境）
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()?;
        }
        Some("pretty") | Some("dev") => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()?;
        }
        _ => {
            // Compact 格式（默认）
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()?;
        }
    }

    Ok(None)
}
