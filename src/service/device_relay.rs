//! 设备后端转发
//!
//! 物理门、接口板由独立的设备后端进程驱动，本进程只通过本机 HTTP 调用它。
//! 每个调用都受 `[device] request_timeout_secs` 约束：超时、连接失败与非 2xx 应答归为
//! `DeviceUnreachable`，应答不是预期的 JSON 归为 `DeviceProtocol`。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DeviceConfig;
use crate::error::{Result, ServerError};
use crate::infra::metrics;
use crate::model::device::{
    DoorOpenResult, FireCancelResult, RelayReply, StepOutcome, SyncKind, TimeSyncResult,
};
use crate::model::event_message::EventMessage;

/// 校时请求的时间格式
pub const DATETIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// 系统时钟与硬件时钟
#[async_trait]
pub trait SystemClock: Send + Sync {
    /// 设置操作系统时钟
    async fn set_system_time(&self, datetime: &str) -> std::result::Result<(), String>;

    /// 把系统时钟写入硬件时钟
    async fn write_hardware_clock(&self) -> std::result::Result<(), String>;
}

/// 通过 `date -s` 与 `hwclock -w` 操作本机时钟
pub struct OsClock;

async fn run_command(program: &str, args: &[&str]) -> std::result::Result<(), String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("{} 启动失败: {}", program, e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(format!(
            "{} 退出码 {:?}: {}",
            program,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

#[async_trait]
impl SystemClock for OsClock {
    async fn set_system_time(&self, datetime: &str) -> std::result::Result<(), String> {
        run_command("date", &["-s", datetime]).await
    }

    async fn write_hardware_clock(&self) -> std::result::Result<(), String> {
        run_command("hwclock", &["-w"]).await
    }
}

/// 设备后端客户端
pub struct DeviceRelay {
    client: Client,
    base_url: Url,
    clock: Arc<dyn SystemClock>,
}

impl DeviceRelay {
    pub fn new(config: &DeviceConfig, clock: Arc<dyn SystemClock>) -> Result<Self> {
        let base_url = Url::parse(&config.backend_base_url).map_err(|e| {
            ServerError::Configuration(format!(
                "无效的设备后端地址 {}: {}",
                config.backend_base_url, e
            ))
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ServerError::Configuration(format!("HTTP 客户端创建失败: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            clock,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ServerError::Configuration(format!("无效的设备接口路径 {}: {}", path, e)))
    }

    /// 发送一次表单 POST 并把应答解析为 `T`
    async fn post_form<T: DeserializeOwned>(
        &self,
        op: &'static str,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        let started = Instant::now();
        let result = self.send(url, form).await;

        metrics::record_relay(
            op,
            match &result {
                Ok(_) => "ok",
                Err(ServerError::DeviceProtocol(_)) => "protocol_error",
                Err(_) => "unreachable",
            },
            started.elapsed().as_secs_f64(),
        );

        if let Err(e) = &result {
            warn!(op, "⚠️ 设备后端调用失败: {}", e);
        }
        result
    }

    async fn send<T: DeserializeOwned>(&self, url: Url, form: &[(&str, String)]) -> Result<T> {
        debug!(%url, "→ 设备后端");

        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| ServerError::DeviceUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::DeviceUnreachable(format!("设备后端返回 {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ServerError::DeviceUnreachable(e.to_string()))?;

        Ok(serde_json::from_slice(&body)?)
    }

    /// 开门
    pub async fn open_door(&self, ib_addr: i64, output_addr: i64, mode: i64) -> Result<DoorOpenResult> {
        info!(ib_addr, output_addr, mode, "🚪 开门");
        self.post_form(
            "door_open",
            "api/dooropen",
            &[
                ("ibaddr", ib_addr.to_string()),
                ("outputaddr", output_addr.to_string()),
                ("mode", mode.to_string()),
            ],
        )
        .await
    }

    /// 消防复位
    pub async fn cancel_fire_alarm(&self, ib_addr: i64) -> Result<FireCancelResult> {
        info!(ib_addr, "🔥 消防复位");
        self.post_form("fire_cancel", "api/firecancel", &[("ibaddr", ib_addr.to_string())])
            .await
    }

    /// 读取门与接口板的实时状态，原样返回，不在本地缓存
    pub async fn status_sync(&self) -> Result<Value> {
        self.post_form("status_sync", "api/statussync", &[]).await
    }

    /// 通知设备后端重新加载数据或配置
    pub async fn data_sync(&self, kind: SyncKind) -> Result<RelayReply> {
        self.post_form("data_sync", "api/datasync", &[("type", kind.form_value().to_string())])
            .await
    }

    /// 拉取 message_id 大于 `after_id` 的事件
    pub async fn fetch_events(&self, after_id: i64) -> Result<Vec<EventMessage>> {
        let reply: RelayReply = self
            .post_form("event_sync", "api/eventsync", &[("after", after_id.to_string())])
            .await?;

        if reply.content.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(reply.content)?)
    }

    /// 设置系统时钟与硬件时钟
    ///
    /// 两个步骤相互独立，任一步失败只记录在结果里，不影响另一步
    pub async fn sync_device_time(&self, datetime: &str) -> Result<TimeSyncResult> {
        NaiveDateTime::parse_from_str(datetime, DATETIME_LAYOUT).map_err(|_| {
            ServerError::Validation(format!("时间格式应为 YYYY-MM-DD HH:MM:SS: {}", datetime))
        })?;

        let system_clock = match self.clock.set_system_time(datetime).await {
            Ok(()) => StepOutcome::ok(),
            Err(e) => {
                warn!("⏰ 设置系统时钟失败: {}", e);
                StepOutcome::failed(e)
            }
        };

        let hardware_clock = match self.clock.write_hardware_clock().await {
            Ok(()) => StepOutcome::ok(),
            Err(e) => {
                warn!("⏰ 写入硬件时钟失败: {}", e);
                StepOutcome::failed(e)
            }
        };

        info!(
            datetime,
            system_ok = system_clock.ok,
            hardware_ok = hardware_clock.ok,
            "⏰ 校时完成"
        );

        Ok(TimeSyncResult {
            datetime: datetime.to_string(),
            system_clock,
            hardware_clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FlakyClock;

    #[async_trait]
    impl SystemClock for FlakyClock {
        async fn set_system_time(&self, _datetime: &str) -> std::result::Result<(), String> {
            Ok(())
        }

        async fn write_hardware_clock(&self) -> std::result::Result<(), String> {
            Err("no rtc".to_string())
        }
    }

    fn relay(base: &str) -> DeviceRelay {
        let config = DeviceConfig {
            backend_base_url: base.to_string(),
            request_timeout_secs: 1,
            ..Default::default()
        };
        DeviceRelay::new(&config, Arc::new(FlakyClock)).unwrap()
    }

    #[tokio::test]
    async fn test_hardware_clock_failure_does_not_abort() {
        let result = relay("http://127.0.0.1:9/")
            .sync_device_time("2024-05-01 08:30:00")
            .await
            .unwrap();
        assert!(result.system_clock.ok);
        assert!(!result.hardware_clock.ok);
        assert_eq!(result.hardware_clock.error.as_deref(), Some("no rtc"));
    }

    #[tokio::test]
    async fn test_bad_datetime_is_validation_error() {
        let err = relay("http://127.0.0.1:9/")
            .sync_device_time("2024/05/01")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let relay = relay("http://127.0.0.1:9/");
        let err = tokio::time::timeout(Duration::from_secs(5), relay.open_door(1, 1, 0))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ServerError::DeviceUnreachable(_)));
    }

    #[test]
    fn test_invalid_base_url_is_configuration_error() {
        let config = DeviceConfig {
            backend_base_url: "not a url".to_string(),
            ..Default::default()
        };
        let err = DeviceRelay::new(&config, Arc::new(OsClock)).err().unwrap();
        assert!(matches!(err, ServerError::Configuration(_)));
    }
}
