use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::device::SyncKind;
use crate::service::device_relay::DeviceRelay;

/// 通知设备后端重新加载数据，不等待结果
///
/// 写操作的 HTTP 应答不依赖同步是否成功，失败只记日志。
#[derive(Clone)]
pub struct ConfigSync {
    relay: Arc<DeviceRelay>,
    enabled: bool,
}

impl ConfigSync {
    pub fn new(relay: Arc<DeviceRelay>, enabled: bool) -> Self {
        Self { relay, enabled }
    }

    /// 人员、凭证、门禁数据变更后调用
    pub fn data_sync(&self) {
        self.spawn(SyncKind::Data);
    }

    /// 控制器配置变更后调用
    pub fn config_sync(&self) {
        self.spawn(SyncKind::Config);
    }

    fn spawn(&self, kind: SyncKind) {
        if !self.enabled {
            debug!(?kind, "同步已关闭，跳过");
            return;
        }

        let relay = self.relay.clone();
        tokio::spawn(async move {
            match relay.data_sync(kind).await {
                Ok(reply) if reply.is_ok() => debug!(?kind, "🔄 同步完成"),
                Ok(reply) => warn!(?kind, retcode = reply.retcode, "🔄 同步被设备后端拒绝"),
                Err(e) => warn!(?kind, "🔄 同步失败: {}", e),
            }
        });
    }
}
