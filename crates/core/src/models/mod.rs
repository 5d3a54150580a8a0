//! # 数据模型
//!
//! 协调层的核心数据结构：任务、子任务、Worker快照以及跨服务事件。
//! 所有模型都实现了序列化和反序列化，时间字段统一使用 `DateTime<Utc>`。

pub mod events;
pub mod task;
pub mod worker;

pub use events::*;
pub use task::*;
pub use worker::*;
