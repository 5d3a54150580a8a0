use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coordinator_core::models::TaskCreatedEvent;
use coordinator_core::{CallContext, Component, SchedulerError, SchedulerResult};
use coordinator_infrastructure::event_bus::{
    EventConsumer, EventHandler, EventProducer, EventRecord, InMemoryTransport,
};
use tokio::sync::mpsc;

/// 记录收到的事件，对指定任务返回错误
struct RecordingHandler {
    seen: mpsc::UnboundedSender<(String, String)>,
    fail_on: Option<String>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, record: &EventRecord) -> SchedulerResult<()> {
        let event: TaskCreatedEvent = record.decode()?;
        let _ = self.seen.send((record.topic.clone(), event.task_id.clone()));
        if self.fail_on.as_deref() == Some(event.task_id.as_str()) {
            return Err(SchedulerError::Internal("handler failure".into()));
        }
        Ok(())
    }
}

fn created(task_id: &str) -> TaskCreatedEvent {
    TaskCreatedEvent {
        task_id: task_id.to_string(),
        created_at: Utc::now(),
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<(String, String)>) -> (String, String) {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event should be delivered")
        .expect("channel open")
}

#[tokio::test]
async fn test_same_key_messages_delivered_in_publish_order() {
    let transport = Arc::new(InMemoryTransport::new());
    let producer = EventProducer::new(transport.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let consumer = EventConsumer::new(
        "scheduler-events",
        transport.clone(),
        vec!["task-created".to_string()],
        "scheduler-service",
        Arc::new(RecordingHandler {
            seen: tx,
            fail_on: None,
        }),
    );
    consumer.start(&CallContext::background()).await.unwrap();

    for id in ["t-1", "t-2", "t-3"] {
        producer.publish("task-created", "tenant-a", &created(id)).await.unwrap();
    }

    let order: Vec<String> = vec![recv(&mut rx).await.1, recv(&mut rx).await.1, recv(&mut rx).await.1];
    assert_eq!(order, vec!["t-1", "t-2", "t-3"]);

    consumer
        .stop(&CallContext::background().with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_handler_error_does_not_block_next_message() {
    let transport = Arc::new(InMemoryTransport::new());
    let producer = EventProducer::new(transport.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let consumer = EventConsumer::new(
        "scheduler-events",
        transport.clone(),
        vec!["task-created".to_string()],
        "scheduler-service",
        Arc::new(RecordingHandler {
            seen: tx,
            fail_on: Some("bad".to_string()),
        }),
    );
    consumer.start(&CallContext::background()).await.unwrap();

    producer.publish("task-created", "bad", &created("bad")).await.unwrap();
    producer.publish("task-created", "good", &created("good")).await.unwrap();

    assert_eq!(recv(&mut rx).await.1, "bad");
    assert_eq!(recv(&mut rx).await.1, "good");

    consumer
        .stop(&CallContext::background().with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_malformed_payload_is_dropped() {
    let transport = Arc::new(InMemoryTransport::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let consumer = EventConsumer::new(
        "scheduler-events",
        transport.clone(),
        vec!["task-created".to_string()],
        "scheduler-service",
        Arc::new(RecordingHandler {
            seen: tx,
            fail_on: None,
        }),
    );
    consumer.start(&CallContext::background()).await.unwrap();

    use coordinator_infrastructure::event_bus::EventTransport;
    transport
        .publish("task-created", "k", "not json".to_string())
        .await
        .unwrap();
    EventProducer::new(transport.clone())
        .publish("task-created", "k", &created("after"))
        .await
        .unwrap();

    assert_eq!(recv(&mut rx).await.1, "after");
    consumer
        .stop(&CallContext::background().with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_topics_are_consumed_independently() {
    /// 在第一个主题上永久阻塞的处理器
    struct BlockingHandler {
        seen: mpsc::UnboundedSender<(String, String)>,
    }

    #[async_trait]
    impl EventHandler for BlockingHandler {
        async fn handle(&self, record: &EventRecord) -> SchedulerResult<()> {
            if record.topic == "slow" {
                std::future::pending::<()>().await;
            }
            let _ = self.seen.send((record.topic.clone(), record.key.clone()));
            Ok(())
        }
    }

    let transport = Arc::new(InMemoryTransport::new());
    let producer = EventProducer::new(transport.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let consumer = EventConsumer::new(
        "multi",
        transport.clone(),
        vec!["slow".to_string(), "fast".to_string()],
        "group",
        Arc::new(BlockingHandler { seen: tx }),
    );
    consumer.start(&CallContext::background()).await.unwrap();

    producer.publish("slow", "s1", &created("s1")).await.unwrap();
    producer.publish("fast", "f1", &created("f1")).await.unwrap();

    assert_eq!(recv(&mut rx).await, ("fast".to_string(), "f1".to_string()));

    // 阻塞的处理器不会退出，stop 在截止时间到达后返回超时错误
    let result = consumer
        .stop(&CallContext::background().with_timeout(Duration::from_millis(50)))
        .await;
    assert!(matches!(result, Err(SchedulerError::DeadlineExceeded(_))));
}
