//! 事件消息：从设备后端同步、查询与推送

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::model::event_message::{EventMessage, Page, PageQuery};
use crate::repository::EventMessageRepository;
use crate::service::device_relay::DeviceRelay;

/// 推送通道容量，慢订阅者超出后会丢失最早的事件
const PUSH_CHANNEL_CAPACITY: usize = 256;

pub struct EventMessageService {
    repo: Arc<EventMessageRepository>,
    relay: Arc<DeviceRelay>,
    push_tx: broadcast::Sender<EventMessage>,
}

impl EventMessageService {
    pub fn new(repo: Arc<EventMessageRepository>, relay: Arc<DeviceRelay>) -> Self {
        let (push_tx, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            repo,
            relay,
            push_tx,
        }
    }

    /// 订阅新写入的事件
    pub fn subscribe(&self) -> broadcast::Receiver<EventMessage> {
        self.push_tx.subscribe()
    }

    /// 追加事件并推送给订阅者，返回实际写入的事件
    pub async fn record(&self, events: &[EventMessage]) -> Result<Vec<EventMessage>> {
        let inserted = self.repo.append(events).await?;
        for event in &inserted {
            // 没有订阅者时发送失败，忽略
            let _ = self.push_tx.send(event.clone());
        }
        Ok(inserted)
    }

    /// 从设备后端拉取本地最大 message_id 之后的事件
    pub async fn sync(&self) -> Result<Vec<EventMessage>> {
        let after = self.repo.max_message_id().await?;
        let fetched = self.relay.fetch_events(after).await?;
        debug!(after, fetched = fetched.len(), "拉取事件");

        let inserted = self.record(&fetched).await?;
        if !inserted.is_empty() {
            info!(count = inserted.len(), "📥 事件已同步");
        }
        Ok(inserted)
    }

    pub async fn find_by_id(&self, message_id: i64) -> Result<EventMessage> {
        self.repo
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("事件 {} 不存在", message_id)))
    }

    pub async fn find_page(&self, query: &PageQuery) -> Result<Page<EventMessage>> {
        let (page, limit) = query.normalized();
        let offset = query
            .offset()
            .ok_or_else(|| ServerError::Validation(format!("页码超出范围: {}", page)))?;
        let (items, total) = self.repo.find_page(offset, limit).await?;
        Ok(Page {
            items,
            page,
            limit,
            total,
        })
    }

    pub async fn find_by_time_range(&self, start: i64, end: i64) -> Result<Vec<EventMessage>> {
        if start > end {
            return Err(ServerError::Validation("开始时间晚于结束时间".to_string()));
        }
        self.repo.find_by_time_range(start, end).await
    }
}
