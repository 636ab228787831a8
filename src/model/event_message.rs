use serde::{Deserialize, Serialize};

/// 门禁事件（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventMessage {
    /// 单调递增的消息 ID，由设备后端分配
    pub message_id: i64,
    /// 事件时间（Unix 秒）
    pub event_time: i64,
    pub event_type: i64,
    pub ib_addr: Option<i64>,
    pub output_addr: Option<i64>,
    pub card_no: Option<String>,
    pub people_id: Option<i64>,
    #[serde(default)]
    pub description: String,
}

pub const MAX_PAGE_LIMIT: i64 = 1000;

/// 分页参数，缺省或为 0 时使用第 1 页、每页 10 条
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// 每页条数超过 [`MAX_PAGE_LIMIT`] 时按上限处理
    pub fn normalized(&self) -> (i64, i64) {
        match (self.page.unwrap_or(0), self.limit.unwrap_or(0)) {
            (page, limit) if page > 0 && limit > 0 => (page, limit.min(MAX_PAGE_LIMIT)),
            _ => (1, 10),
        }
    }

    /// 页码过大导致偏移量溢出时返回 `None`
    pub fn offset(&self) -> Option<i64> {
        let (page, limit) = self.normalized();
        (page - 1).checked_mul(limit)
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// 时间范围查询（Unix 秒，闭区间）
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRangeQuery {
    pub start_time: i64,
    pub end_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let q = PageQuery::default();
        assert_eq!(q.normalized(), (1, 10));
        assert_eq!(q.offset(), Some(0));

        let q = PageQuery {
            page: Some(3),
            limit: Some(20),
        };
        assert_eq!(q.offset(), Some(40));

        // 只给一个参数时同样回落到默认值
        let q = PageQuery {
            page: Some(2),
            limit: None,
        };
        assert_eq!(q.normalized(), (1, 10));
    }

    #[test]
    fn test_page_bounds() {
        let q = PageQuery {
            page: Some(2),
            limit: Some(50_000),
        };
        assert_eq!(q.normalized(), (2, MAX_PAGE_LIMIT));
        assert_eq!(q.offset(), Some(MAX_PAGE_LIMIT));

        let q = PageQuery {
            page: Some(i64::MAX),
            limit: Some(10),
        };
        assert_eq!(q.offset(), None);
    }
}
