use clap::{Parser, Subcommand};

// 确保 Parser trait 被使用
impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// OWNSA Server - 门禁控制器管理后台
#[derive(Parser, Debug, Default)]
#[command(name = "ownsa-server")]
#[command(version)]
#[command(about = "门禁控制器管理后台（用户、人员、凭证、门禁配置与设备指令转发）", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 服务器监听地址
    #[arg(long, value_name = "ADDRESS", help = "服务器监听地址")]
    pub host: Option<String>,

    /// HTTP 端口
    #[arg(long, value_name = "PORT", help = "HTTP 端口")]
    pub port: Option<u16>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径")]
    pub log_file: Option<String>,

    /// JWT 密钥
    #[arg(long, value_name = "SECRET", help = "JWT 签名密钥")]
    pub jwt_secret: Option<String>,

    /// 设备后端地址
    #[arg(long, value_name = "URL", help = "设备后端基础 URL")]
    pub backend_url: Option<String>,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（不输出日志）")]
    pub quiet: bool,

    /// 开发模式（等同于 --log-level debug --log-format pretty）
    #[arg(long, help = "启用开发模式")]
    pub dev: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 初始化四个存储的表结构，并可选创建初始管理员
    Migrate {
        /// 初始管理员用户名（仅在没有任何用户时创建）
        #[arg(long, value_name = "NAME")]
        admin_user: Option<String>,
        /// 初始管理员密码
        #[arg(long, value_name = "PASSWORD")]
        admin_password: Option<String>,
    },
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置）
    ShowConfig,
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if self.dev {
            return Some("debug".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        // 根据 verbose 级别设置
        match self.verbose {
            0 => None, // 使用默认或配置文件
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        if self.dev {
            return Some("pretty".to_string());
        }
        self.log_format.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_overrides_verbose() {
        let cli = Cli::try_parse_from(["ownsa-server", "-vv", "-q"]).unwrap();
        assert_eq!(cli.get_log_level().as_deref(), Some("error"));
    }

    #[test]
    fn test_migrate_subcommand() {
        let cli = Cli::try_parse_from([
            "ownsa-server",
            "migrate",
            "--admin-user",
            "admin",
            "--admin-password",
            "secret",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Migrate { admin_user, admin_password }) => {
                assert_eq!(admin_user.as_deref(), Some("admin"));
                assert_eq!(admin_password.as_deref(), Some("secret"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
