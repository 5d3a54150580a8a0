use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use coordinator_core::config::{AppConfig, TransportKind};
use coordinator_core::{HealthRegistry, SchedulerService, TaskStore, WorkerDirectory};
use coordinator_dispatcher::{
    discovery_from_config, selection_strategy_from_name, DiscoveryReconciler,
    HeartbeatEventHandler, HeartbeatTracker, TaskCreatedHandler, TaskLifecycleHandler,
    TaskScheduler, WorkerRegistry,
};
use coordinator_infrastructure::{
    EventConsumer, EventHandler, EventProducer, EventTransport, HttpTaskStore,
    HttpWorkerDirectory, InMemoryTaskStore, InMemoryTransport, RedisStreamSettings,
    RedisStreamTransport, ResilientCaller, ResilientTaskStore, ResilientWorkerDirectory,
    TransportHealthChecker,
};
use tracing::info;

use crate::runner::{ComponentRunner, RunnerError};

/// 未配置消费者名称时使用的默认值
const DEFAULT_CONSUMER_NAME: &str = "coordinator";

/// 事件传输在健康注册表中的服务名
pub const EVENT_BUS_SERVICE: &str = "event-bus";

/// 协调层应用
///
/// 按配置装配事件传输、Worker注册表、心跳检测、服务发现、调度器与事件消费者，
/// 并把它们全部注册到同一个 [`ComponentRunner`]。
pub struct Application {
    runner: ComponentRunner,
    registry: Arc<WorkerRegistry>,
    task_store: Arc<dyn TaskStore>,
    scheduler: Arc<TaskScheduler>,
    producer: Arc<EventProducer>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!(transport = ?config.event_bus.transport, "初始化协调层应用");

        let transport = create_transport(&config).await?;
        let topics = config.event_bus.topics.clone();
        let producer = Arc::new(EventProducer::new(Arc::clone(&transport)));

        let mut runner = ComponentRunner::new(config.runner.shutdown_timeout());
        runner.health().set_checker(
            EVENT_BUS_SERVICE,
            Arc::new(TransportHealthChecker::new(Arc::clone(&transport))),
        );
        runner.register(producer.clone());

        // Worker注册表与心跳检测
        let registry = Arc::new(WorkerRegistry::new());
        let mut tracker = HeartbeatTracker::new(Arc::clone(&registry), &config.registry);
        if config.registry.publish_status_changes {
            tracker = tracker.with_publisher(producer.clone(), topics.worker_status_changed.clone());
        }
        let tracker = Arc::new(tracker);
        runner.register(tracker.clone());

        if config.discovery.enabled {
            let reconciler = DiscoveryReconciler::new(
                discovery_from_config(&config.discovery),
                Arc::clone(&registry),
                config.discovery.service_name.clone(),
                config.discovery.interval(),
            );
            runner.register(Arc::new(reconciler));
        }

        // 远程依赖统一经过限流、熔断与重试
        let task_store = create_task_store(&config)?;
        let mut scheduler = TaskScheduler::new(
            Arc::clone(&task_store),
            Arc::clone(&registry),
            producer.clone(),
            topics.clone(),
        )
        .with_selection_strategy(
            selection_strategy_from_name(&config.scheduler.selection_strategy)
                .context("创建Worker选择策略失败")?,
        );
        if let Some(directory) = create_worker_directory(&config)? {
            scheduler = scheduler.with_directory(directory);
        }
        let scheduler = Arc::new(scheduler);

        let consumer = |name: &str, topics: Vec<String>, handler: Arc<dyn EventHandler>| {
            Arc::new(
                EventConsumer::new(
                    name,
                    Arc::clone(&transport),
                    topics,
                    config.event_bus.group_id.clone(),
                    handler,
                )
                .with_read_error_backoff(config.event_bus.read_error_backoff()),
            )
        };

        runner.register(consumer(
            "heartbeat-consumer",
            vec![topics.worker_heartbeat.clone()],
            Arc::new(HeartbeatEventHandler::new(tracker)),
        ));

        let scheduler_service: Arc<dyn SchedulerService> = scheduler.clone();
        runner.register(consumer(
            "task-created-consumer",
            vec![topics.task_created.clone()],
            Arc::new(
                TaskCreatedHandler::new(scheduler_service)
                    .with_timeout(config.scheduler.request_timeout()),
            ),
        ));

        let lifecycle = TaskLifecycleHandler::new(Arc::clone(&task_store), topics.clone())
            .with_timeout(config.scheduler.request_timeout());
        runner.register(consumer(
            "task-lifecycle-consumer",
            lifecycle.topics(),
            Arc::new(lifecycle),
        ));

        let summary_registry = Arc::clone(&registry);
        runner.defer("registry-summary", move || async move {
            info!(workers = summary_registry.count(), "关停时的Worker注册表规模");
            Ok(())
        });

        info!(components = ?runner.component_names(), "应用装配完成");

        Ok(Self {
            runner,
            registry,
            task_store,
            scheduler,
            producer,
        })
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.task_store
    }

    pub fn scheduler(&self) -> Arc<dyn SchedulerService> {
        self.scheduler.clone()
    }

    pub fn producer(&self) -> &Arc<EventProducer> {
        &self.producer
    }

    pub fn runner(&self) -> &ComponentRunner {
        &self.runner
    }

    /// 组件与事件传输的健康状态
    pub fn health(&self) -> &Arc<HealthRegistry> {
        self.runner.health()
    }

    /// 运行到收到操作系统关停信号
    pub async fn run(&self) -> Result<(), RunnerError> {
        self.runner.start().await
    }

    /// 运行到 `shutdown` 完成
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), RunnerError>
    where
        F: Future<Output = ()> + Send,
    {
        self.runner.start_with_shutdown(shutdown).await
    }
}

async fn create_transport(config: &AppConfig) -> Result<Arc<dyn EventTransport>> {
    let bus = &config.event_bus;
    match bus.transport {
        TransportKind::InMemory => {
            info!(retention = bus.in_memory_retention, "使用进程内事件传输");
            Ok(Arc::new(InMemoryTransport::with_retention(bus.in_memory_retention)))
        }
        TransportKind::RedisStream => {
            let consumer_name = if bus.consumer_name.is_empty() {
                DEFAULT_CONSUMER_NAME.to_string()
            } else {
                bus.consumer_name.clone()
            };
            info!(url = %bus.redis_url, consumer = %consumer_name, "连接 Redis Streams 事件传输");

            let transport = RedisStreamTransport::connect(RedisStreamSettings {
                url: bus.redis_url.clone(),
                consumer_name,
                block_ms: bus.block_ms,
                read_count: bus.read_count,
            })
            .await
            .context("连接 Redis 失败")?;
            Ok(Arc::new(transport))
        }
    }
}

fn create_task_store(config: &AppConfig) -> Result<Arc<dyn TaskStore>> {
    match &config.scheduler.task_store_url {
        Some(url) => {
            info!(url = %url, "使用远端任务存储");
            let inner = HttpTaskStore::new(url, config.scheduler.request_timeout())
                .context("创建任务存储客户端失败")?;
            let caller = Arc::new(ResilientCaller::new("task-service", &config.resilience));
            Ok(Arc::new(ResilientTaskStore::new(Arc::new(inner), caller)))
        }
        None => {
            info!("使用进程内任务存储");
            Ok(Arc::new(InMemoryTaskStore::new()))
        }
    }
}

fn create_worker_directory(config: &AppConfig) -> Result<Option<Arc<dyn WorkerDirectory>>> {
    let Some(url) = &config.scheduler.worker_directory_url else {
        return Ok(None);
    };

    info!(url = %url, "使用远端Worker目录");
    let inner = HttpWorkerDirectory::new(url, config.scheduler.request_timeout())
        .context("创建Worker目录客户端失败")?;
    let caller = Arc::new(ResilientCaller::new("worker-manager", &config.resilience));
    Ok(Some(Arc::new(ResilientWorkerDirectory::new(Arc::new(inner), caller))))
}
