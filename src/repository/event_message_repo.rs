//! 事件消息仓库（event_message 库，只追加）

use std::sync::Arc;

use crate::error::{Result, ServerError};
use crate::infra::Stores;
use crate::model::event_message::EventMessage;

const SELECT_EVENT: &str = r#"
    SELECT message_id, event_time, event_type, ib_addr, output_addr, card_no, people_id, description
    FROM event_message
"#;

#[derive(Clone)]
pub struct EventMessageRepository {
    stores: Arc<Stores>,
}

impl EventMessageRepository {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self { stores }
    }

    /// 追加事件，已存在的 message_id 被忽略；返回实际写入的事件
    pub async fn append(&self, events: &[EventMessage]) -> Result<Vec<EventMessage>> {
        let mut inserted = Vec::new();
        let mut tx = self.stores.event_message.begin().await?;
        for event in events {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO event_message
                    (message_id, event_time, event_type, ib_addr, output_addr, card_no, people_id, description)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.message_id)
            .bind(event.event_time)
            .bind(event.event_type)
            .bind(event.ib_addr)
            .bind(event.output_addr)
            .bind(&event.card_no)
            .bind(event.people_id)
            .bind(&event.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| ServerError::Database(format!("写入事件失败: {}", e)))?;

            if result.rows_affected() > 0 {
                inserted.push(event.clone());
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn find_by_id(&self, message_id: i64) -> Result<Option<EventMessage>> {
        let event = sqlx::query_as::<_, EventMessage>(&format!("{SELECT_EVENT} WHERE message_id = ?"))
            .bind(message_id)
            .fetch_optional(&self.stores.event_message)
            .await?;
        Ok(event)
    }

    /// 按 message_id 倒序分页，返回 (当前页, 总数)
    pub async fn find_page(&self, offset: i64, limit: i64) -> Result<(Vec<EventMessage>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_message")
            .fetch_one(&self.stores.event_message)
            .await?;
        let items = sqlx::query_as::<_, EventMessage>(&format!(
            "{SELECT_EVENT} ORDER BY message_id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.stores.event_message)
        .await?;
        Ok((items, total))
    }

    /// 闭区间 [start, end] 内的事件，按时间升序
    pub async fn find_by_time_range(&self, start: i64, end: i64) -> Result<Vec<EventMessage>> {
        let events = sqlx::query_as::<_, EventMessage>(&format!(
            "{SELECT_EVENT} WHERE event_time BETWEEN ? AND ? ORDER BY event_time, message_id"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.stores.event_message)
        .await?;
        Ok(events)
    }

    /// 本地已保存的最大 message_id，没有事件时为 0
    pub async fn max_message_id(&self) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(message_id) FROM event_message")
            .fetch_one(&self.stores.event_message)
            .await?;
        Ok(max.unwrap_or(0))
    }
}
