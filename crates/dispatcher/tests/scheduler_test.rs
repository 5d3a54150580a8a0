use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coordinator_core::config::TopicConfig;
use coordinator_core::models::{
    TaskAssignedEvent, TaskCompletedEvent, TaskCreatedEvent, TaskScheduledEvent,
};
use coordinator_core::{CallContext, Component, SchedulerError, SchedulerService, TaskStatus};
use coordinator_dispatcher::{
    FixedPartitions, RoundRobinStrategy, TaskCreatedHandler, TaskLifecycleHandler, TaskScheduler,
    WorkerRegistry,
};
use coordinator_infrastructure::event_bus::{
    EventConsumer, EventHandler, EventProducer, EventRecord, EventTransport, InMemoryTransport,
};
use coordinator_testing_utils::{
    MockTaskStore, MockWorkerDirectory, TaskBuilder, TestEnv, WorkerInfoBuilder,
};

struct Harness {
    store: MockTaskStore,
    registry: Arc<WorkerRegistry>,
    transport: Arc<InMemoryTransport>,
    scheduler: TaskScheduler,
}

fn harness() -> Harness {
    let store = MockTaskStore::new();
    let registry = Arc::new(WorkerRegistry::new());
    let transport = Arc::new(InMemoryTransport::new());
    let scheduler = TaskScheduler::new(
        Arc::new(store.clone()),
        registry.clone(),
        Arc::new(EventProducer::new(transport.clone())),
        TopicConfig::default(),
    );
    Harness {
        store,
        registry,
        transport,
        scheduler,
    }
}

fn caps(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn assigned(transport: &InMemoryTransport) -> Vec<TaskAssignedEvent> {
    transport
        .published("task-assigned")
        .iter()
        .map(|r| r.decode().unwrap())
        .collect()
}

fn scheduled(transport: &InMemoryTransport) -> Vec<TaskScheduledEvent> {
    transport
        .published("task-scheduled")
        .iter()
        .map(|r| r.decode().unwrap())
        .collect()
}

#[tokio::test]
async fn test_schedule_without_matching_workers_is_unavailable() {
    let h = harness();
    h.registry.register("cpu-1", "10.0.0.1:50051", caps(&["cpu"])).unwrap();
    let task = TaskBuilder::new().with_capability("gpu").build();
    h.store.insert(task.clone());

    let ctx = CallContext::background();
    let err = h.scheduler.schedule_task(&ctx, &task.id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Unavailable(_)));

    let status = h.scheduler.get_task_status(&ctx, &task.id).await.unwrap();
    assert_eq!(status, TaskStatus::Pending);
    assert!(h.transport.published("task-assigned").is_empty());
    assert!(h.transport.published("task-scheduled").is_empty());
    assert_eq!(h.store.calls("update_task"), 0);
}

#[tokio::test]
async fn test_schedule_single_worker() {
    let h = harness();
    h.registry.register("w1", "10.0.0.1:50051", caps(&["gpu"])).unwrap();
    let task = TaskBuilder::new().with_capability("gpu").build();
    h.store.insert(task.clone());

    let ctx = CallContext::background();
    let schedule = h.scheduler.schedule_task(&ctx, &task.id).await.unwrap();
    assert_eq!(schedule.worker_ids, vec!["w1"]);
    assert!(schedule.subtask_ids.is_empty());

    let assignments = assigned(&h.transport);
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].task_id, task.id);
    assert_eq!(assignments[0].worker_id, "w1");

    let scheduled_events = scheduled(&h.transport);
    assert_eq!(scheduled_events.len(), 1);
    assert_eq!(scheduled_events[0].worker_ids, vec!["w1"]);
    assert_eq!(h.transport.published("task-scheduled")[0].key, task.id);

    assert_eq!(h.store.task(&task.id).unwrap().status, TaskStatus::Scheduled);
}

#[tokio::test]
async fn test_schedule_prefers_least_loaded_worker() {
    let h = harness();
    h.registry.register("w1", "a", caps(&[])).unwrap().set_load(90);
    h.registry.register("w2", "b", caps(&[])).unwrap().set_load(20);
    let task = TaskBuilder::new().build();
    h.store.insert(task.clone());

    let schedule = h
        .scheduler
        .schedule_task(&CallContext::background(), &task.id)
        .await
        .unwrap();
    assert_eq!(schedule.worker_ids, vec!["w2"]);
}

#[tokio::test]
async fn test_schedule_rejects_non_pending_task_without_side_effects() {
    let h = harness();
    h.registry.register("w1", "a", caps(&[])).unwrap();
    let task = TaskBuilder::new().running().build();
    h.store.insert(task.clone());

    let err = h
        .scheduler
        .schedule_task(&CallContext::background(), &task.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::InvalidTransition {
            from: TaskStatus::Running,
            to: TaskStatus::Scheduled
        }
    ));
    assert!(h.transport.published("task-assigned").is_empty());
}

#[tokio::test]
async fn test_schedule_missing_task() {
    let h = harness();
    let err = h
        .scheduler
        .schedule_task(&CallContext::background(), "missing")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_subtasks_are_assigned_round_robin_across_sources() {
    let store = MockTaskStore::new();
    let registry = Arc::new(WorkerRegistry::new());
    registry.register("w1", "a", caps(&["gpu"])).unwrap();
    let directory = MockWorkerDirectory::with_workers(vec![
        WorkerInfoBuilder::new("w1").with_capability("gpu").build(),
        WorkerInfoBuilder::new("w2").with_capability("gpu").build(),
        WorkerInfoBuilder::new("w3")
            .with_capability("gpu")
            .with_status(coordinator_core::WorkerStatus::Inactive)
            .build(),
    ]);
    let transport = Arc::new(InMemoryTransport::new());
    let scheduler = TaskScheduler::new(
        Arc::new(store.clone()),
        registry,
        Arc::new(EventProducer::new(transport.clone())),
        TopicConfig::default(),
    )
    .with_directory(Arc::new(directory.clone()))
    .with_selection_strategy(Arc::new(RoundRobinStrategy::new()))
    .with_division_strategy(Arc::new(FixedPartitions::new(3)));

    let task = TaskBuilder::new().with_capability("gpu").build();
    store.insert(task.clone());

    let schedule = scheduler
        .schedule_task(&CallContext::background(), &task.id)
        .await
        .unwrap();
    assert_eq!(schedule.subtask_ids.len(), 3);
    assert_eq!(schedule.worker_ids, vec!["w1", "w2"]);
    assert_eq!(directory.calls("find_available_workers"), 1);

    let assignments = assigned(&transport);
    let workers: Vec<&str> = assignments.iter().map(|a| a.worker_id.as_str()).collect();
    assert_eq!(workers, vec!["w1", "w2", "w1"]);
    assert!(assignments
        .iter()
        .all(|a| schedule.subtask_ids.contains(&a.task_id)));
    // 子任务分配事件以父任务 ID 作为消息键
    assert!(transport
        .published("task-assigned")
        .iter()
        .all(|r| r.key == task.id));
}

#[tokio::test]
async fn test_assignment_stops_once_context_is_cancelled() {
    let h = harness();
    h.registry.register("w1", "a", caps(&[])).unwrap();
    let ctx = CallContext::background();
    ctx.cancel();

    let err = h.scheduler.assign_task(&ctx, "t1", "w1").await.unwrap_err();
    assert!(matches!(err, SchedulerError::DeadlineExceeded(_)));

    // 子任务经过同一条分配路径
    let scheduler = harness_scheduler_with_partitions(&h, 3);
    let task = TaskBuilder::new().build();
    h.store.insert(task.clone());
    let err = scheduler.schedule_task(&ctx, &task.id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::DeadlineExceeded(_)));

    assert!(h.transport.published("task-assigned").is_empty());
    assert_eq!(h.store.task(&task.id).unwrap().status, TaskStatus::Pending);
}

fn harness_scheduler_with_partitions(h: &Harness, partitions: usize) -> TaskScheduler {
    TaskScheduler::new(
        Arc::new(h.store.clone()),
        h.registry.clone(),
        Arc::new(EventProducer::new(h.transport.clone())),
        TopicConfig::default(),
    )
    .with_division_strategy(Arc::new(FixedPartitions::new(partitions)))
}

#[tokio::test]
async fn test_store_failure_aborts_after_assignment() {
    let h = harness();
    h.registry.register("w1", "a", caps(&[])).unwrap();
    let task = TaskBuilder::new().build();
    h.store.insert(task.clone());
    h.store
        .fail_operation("update_task", 1, || SchedulerError::Network("connection reset".into()));

    let err = h
        .scheduler
        .schedule_task(&CallContext::background(), &task.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Network(_)));

    // 已发布的分配事件不回滚，任务状态保持不变
    assert_eq!(h.transport.published("task-assigned").len(), 1);
    assert!(h.transport.published("task-scheduled").is_empty());
    assert_eq!(h.store.task(&task.id).unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_task_created_handler_tolerates_duplicates() {
    let h = harness();
    h.registry.register("w1", "a", caps(&[])).unwrap();
    let task = TaskBuilder::new().build();
    h.store.insert(task.clone());

    let scheduler: Arc<dyn SchedulerService> = Arc::new(h.scheduler);
    let handler = TaskCreatedHandler::new(scheduler);

    let event = TaskCreatedEvent {
        task_id: task.id.clone(),
        created_at: Utc::now(),
    };
    h.transport
        .publish("task-created", &task.id, serde_json::to_string(&event).unwrap())
        .await
        .unwrap();
    let record: EventRecord = h.transport.published("task-created").remove(0);

    handler.handle(&record).await.unwrap();
    handler.handle(&record).await.unwrap();

    assert_eq!(h.transport.published("task-scheduled").len(), 1);
    assert_eq!(h.store.task(&task.id).unwrap().status, TaskStatus::Scheduled);
}

#[tokio::test]
async fn test_lifecycle_handler_completes_scheduled_task() {
    let store = MockTaskStore::new();
    let task = TaskBuilder::new().with_status(TaskStatus::Scheduled).build();
    store.insert(task.clone());

    let handler = TaskLifecycleHandler::new(Arc::new(store.clone()), TopicConfig::default());
    let transport = InMemoryTransport::new();
    let completed = TaskCompletedEvent {
        task_id: task.id.clone(),
        result: [("accuracy".to_string(), "0.97".to_string())].into_iter().collect(),
        completed_at: Utc::now(),
    };
    transport
        .publish("task-completed", &task.id, serde_json::to_string(&completed).unwrap())
        .await
        .unwrap();
    let record = transport.published("task-completed").remove(0);

    handler.handle(&record).await.unwrap();

    let stored = store.task(&task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.output.get("accuracy").map(String::as_str), Some("0.97"));
    assert_eq!(stored.completed_at, Some(completed.completed_at));

    // 终态之后的事件被丢弃，任务保持不变
    handler.handle(&record).await.unwrap();
    assert_eq!(store.calls("update_task"), 1);
}

#[tokio::test]
async fn test_task_created_event_flows_through_consumer() {
    let h = harness();
    h.registry.register("w1", "a", caps(&[])).unwrap();
    let task = TaskBuilder::new().build();
    h.store.insert(task.clone());

    let producer = EventProducer::new(h.transport.clone());
    let consumer = EventConsumer::new(
        "task-created-consumer",
        h.transport.clone(),
        vec!["task-created".to_string()],
        "scheduler-service",
        Arc::new(TaskCreatedHandler::new(Arc::new(h.scheduler))),
    );
    consumer.start(&CallContext::background()).await.unwrap();

    producer
        .publish(
            "task-created",
            &task.id,
            &TaskCreatedEvent {
                task_id: task.id.clone(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let store = h.store.clone();
    let id = task.id.clone();
    let scheduled = TestEnv::wait_for(
        || {
            let store = store.clone();
            let id = id.clone();
            async move { store.task(&id).map(|t| t.status) == Some(TaskStatus::Scheduled) }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(scheduled);

    consumer
        .stop(&CallContext::background().with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
}
