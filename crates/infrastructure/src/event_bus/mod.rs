//! 事件总线
//!
//! 基于命名主题的发布/订阅抽象，用于服务之间的事件编排。消息按键分区，
//! 只有相同键的消息之间保证投递顺序。

pub mod consumer;
pub mod health;
pub mod in_memory;
pub mod producer;
pub mod redis_stream;
pub mod transport;

pub use consumer::EventConsumer;
pub use health::TransportHealthChecker;
pub use in_memory::InMemoryTransport;
pub use producer::EventProducer;
pub use redis_stream::{RedisStreamSettings, RedisStreamTransport};
pub use transport::{EventHandler, EventRecord, EventTransport, TopicReader};
