//! 组件生命周期管理
//!
//! [`ComponentRunner`] 按注册顺序启动组件，阻塞等待关停触发，然后按注册顺序
//! 停止组件，最后以后进先出的顺序执行清理回调。组件的启停同步记录在
//! [`HealthRegistry`] 中。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use coordinator_core::{
    CallContext, Component, HealthRegistry, HealthStatus, SchedulerError, SchedulerResult,
};
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::shutdown::wait_for_shutdown_signal;

/// 默认关停超时
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, SchedulerResult<()>> + Send>;

struct Cleanup {
    name: String,
    run: CleanupFn,
}

/// 关停阶段的单个失败
#[derive(Debug, Error)]
pub enum ShutdownFailure {
    #[error("组件 {component} 停止失败: {source}")]
    Stop {
        component: String,
        source: SchedulerError,
    },

    #[error("清理回调 {name} 执行失败: {source}")]
    Cleanup { name: String, source: SchedulerError },

    #[error("关停超时，跳过清理回调 {name}")]
    CleanupSkipped { name: String },
}

#[derive(Debug, Error)]
pub enum RunnerError {
    /// 某个组件启动失败，已启动的组件已被停止
    #[error("组件 {component} 启动失败: {source}")]
    Startup {
        component: String,
        source: SchedulerError,
        shutdown_errors: Vec<ShutdownFailure>,
    },

    #[error("关停过程中出现 {} 个错误", .0.len())]
    Shutdown(Vec<ShutdownFailure>),
}

/// 组件运行器
pub struct ComponentRunner {
    components: Vec<Arc<dyn Component>>,
    cleanups: Mutex<Vec<Cleanup>>,
    started: Mutex<Vec<Arc<dyn Component>>>,
    shutdown_timeout: Duration,
    root: CancellationToken,
    health: Arc<HealthRegistry>,
}

impl Default for ComponentRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

impl ComponentRunner {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            components: Vec::new(),
            cleanups: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            shutdown_timeout,
            root: CancellationToken::new(),
            health: Arc::new(HealthRegistry::new()),
        }
    }

    pub fn register(&mut self, component: Arc<dyn Component>) -> &mut Self {
        self.health.register_service(component.name());
        self.components.push(component);
        self
    }

    /// 注册关停时执行的清理回调，按后进先出的顺序执行
    pub fn defer<F, Fut>(&mut self, name: impl Into<String>, cleanup: F) -> &mut Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = SchedulerResult<()>> + Send + 'static,
    {
        self.cleanups.get_mut().push(Cleanup {
            name: name.into(),
            run: Box::new(move || Box::pin(cleanup())),
        });
        self
    }

    /// 根取消令牌，取消它会触发关停
    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// 组件健康状态，启动成功后为 SERVING，停止后为 NOT_SERVING
    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// 启动所有组件，并阻塞到收到操作系统关停信号
    pub async fn start(&self) -> Result<(), RunnerError> {
        self.start_with_shutdown(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                // 无法监听信号时只能依赖根令牌触发关停
                error!(error = %e, "安装信号处理器失败");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// 与 [`start`](Self::start) 相同，但由任意 future 充当关停触发器
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> Result<(), RunnerError>
    where
        F: Future<Output = ()> + Send,
    {
        let ctx = CallContext::new(self.root.clone());

        for component in &self.components {
            info!(component = component.name(), "启动组件");
            if let Err(source) = component.start(&ctx).await {
                error!(component = component.name(), error = %source, "组件启动失败，停止已启动的组件");
                self.health.set_status(component.name(), HealthStatus::NotServing);
                self.root.cancel();
                let shutdown_errors = self.stop_all().await;
                return Err(RunnerError::Startup {
                    component: component.name().to_string(),
                    source,
                    shutdown_errors,
                });
            }
            self.health.set_status(component.name(), HealthStatus::Serving);
            self.started.lock().await.push(Arc::clone(component));
        }

        info!(components = self.components.len(), "所有组件已启动，等待关停信号");

        tokio::select! {
            _ = shutdown => info!("收到关停触发，开始停止组件"),
            _ = self.root.cancelled() => info!("根令牌已取消，开始停止组件"),
        }

        self.root.cancel();
        let errors = self.stop_all().await;
        if errors.is_empty() {
            info!("所有组件已停止");
            Ok(())
        } else {
            Err(RunnerError::Shutdown(errors))
        }
    }

    /// 停止已启动的组件并执行清理回调
    ///
    /// 每个组件最多被停止一次，重复调用不会产生副作用。所有步骤共享同一个
    /// 关停截止时间。
    pub async fn stop_all(&self) -> Vec<ShutdownFailure> {
        let ctx = CallContext::background().with_timeout(self.shutdown_timeout);
        let mut errors = Vec::new();

        let started: Vec<Arc<dyn Component>> = std::mem::take(&mut *self.started.lock().await);
        for component in started {
            info!(component = component.name(), "停止组件");
            let budget = ctx.remaining().unwrap_or(self.shutdown_timeout);
            let outcome = match tokio::time::timeout(budget, component.stop(&ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SchedulerError::DeadlineExceeded(format!(
                    "组件 {} 未在关停期限内停止",
                    component.name()
                ))),
            };
            self.health.set_status(component.name(), HealthStatus::NotServing);
            if let Err(source) = outcome {
                warn!(component = component.name(), error = %source, "组件停止失败");
                errors.push(ShutdownFailure::Stop {
                    component: component.name().to_string(),
                    source,
                });
            }
        }

        let cleanups: Vec<Cleanup> = std::mem::take(&mut *self.cleanups.lock().await);
        for cleanup in cleanups.into_iter().rev() {
            if ctx.is_done() {
                warn!(cleanup = %cleanup.name, "关停超时，跳过清理回调");
                errors.push(ShutdownFailure::CleanupSkipped { name: cleanup.name });
                continue;
            }

            if let Err(source) = (cleanup.run)().await {
                warn!(cleanup = %cleanup.name, error = %source, "清理回调执行失败");
                errors.push(ShutdownFailure::Cleanup {
                    name: cleanup.name,
                    source,
                });
            }
        }

        errors
    }
}
