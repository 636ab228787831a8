// Infrastructure layer - 基础设施层
// 负责存储连接与监控指标

pub mod database;
pub mod metrics;

// 数据库连接管理
pub use database::Stores;
