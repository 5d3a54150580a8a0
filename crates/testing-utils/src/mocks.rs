//! In-memory test doubles for the coordinator traits

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coordinator_core::models::{ResourceRequirement, WorkerRegistration};
use coordinator_core::{
    CallContext, Component, SchedulerError, SchedulerResult, Task, TaskFilter, TaskStore,
    WorkerDirectory, WorkerInfo, WorkerStatus,
};

type ErrorFactory = Arc<dyn Fn() -> SchedulerError + Send + Sync>;

/// Queue of injected failures, consumed one per call
#[derive(Clone, Default)]
struct FailurePlan {
    queue: Arc<Mutex<VecDeque<ErrorFactory>>>,
}

impl FailurePlan {
    fn push(&self, times: usize, factory: ErrorFactory) {
        let mut queue = self.queue.lock().unwrap();
        for _ in 0..times {
            queue.push_back(factory.clone());
        }
    }

    fn next(&self) -> Option<SchedulerError> {
        self.queue.lock().unwrap().pop_front().map(|make| make())
    }

    fn clear(&self) {
        self.queue.lock().unwrap().clear();
    }
}

/// Mock implementation of TaskStore for testing
///
/// Every call is counted by operation name. Injected failures are returned
/// before the call touches the stored tasks.
#[derive(Clone, Default)]
pub struct MockTaskStore {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    failures: FailurePlan,
    operation_failures: Arc<Mutex<HashMap<String, FailurePlan>>>,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let store = Self::new();
        for task in tasks {
            store.insert(task);
        }
        store
    }

    pub fn insert(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id.clone(), task);
    }

    /// Current stored copy, bypassing counters and failures
    pub fn task(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    /// The next `times` calls fail with the produced error
    pub fn fail_times<F>(&self, times: usize, make_error: F)
    where
        F: Fn() -> SchedulerError + Send + Sync + 'static,
    {
        self.failures.push(times, Arc::new(make_error));
    }

    /// The next `times` calls of `operation` fail with the produced error
    pub fn fail_operation<F>(&self, operation: &str, times: usize, make_error: F)
    where
        F: Fn() -> SchedulerError + Send + Sync + 'static,
    {
        self.operation_failures
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push(times, Arc::new(make_error));
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
        self.operation_failures.lock().unwrap().clear();
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn enter(&self, operation: &'static str) -> SchedulerResult<()> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        let targeted = self
            .operation_failures
            .lock()
            .unwrap()
            .get(operation)
            .and_then(|plan| plan.next());
        match targeted.or_else(|| self.failures.next()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn create_task(&self, _ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        self.enter("create_task")?;
        self.insert(task.clone());
        Ok(task.clone())
    }

    async fn get_task(&self, _ctx: &CallContext, id: &str) -> SchedulerResult<Task> {
        self.enter("get_task")?;
        self.task(id)
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })
    }

    async fn update_task(&self, _ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        self.enter("update_task")?;
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(SchedulerError::TaskNotFound {
                id: task.id.clone(),
            });
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task.clone())
    }

    async fn delete_task(&self, _ctx: &CallContext, id: &str) -> SchedulerResult<()> {
        self.enter("delete_task")?;
        self.tasks
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })
    }

    async fn list_tasks(&self, _ctx: &CallContext, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        self.enter("list_tasks")?;
        let tasks = self.tasks.lock().unwrap();
        let mut filtered: Vec<Task> = tasks.values().cloned().collect();

        if let Some(status) = filter.status {
            filtered.retain(|t| t.status == status);
        }
        filtered.sort_by_key(|t| t.created_at);
        if let Some(limit) = filter.limit {
            filtered.truncate(limit);
        }
        Ok(filtered)
    }
}

/// Mock implementation of WorkerDirectory for testing
#[derive(Clone, Default)]
pub struct MockWorkerDirectory {
    workers: Arc<Mutex<Vec<WorkerInfo>>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    failures: FailurePlan,
}

impl MockWorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: Vec<WorkerInfo>) -> Self {
        let directory = Self::new();
        *directory.workers.lock().unwrap() = workers;
        directory
    }

    pub fn fail_times<F>(&self, times: usize, make_error: F)
    where
        F: Fn() -> SchedulerError + Send + Sync + 'static,
    {
        self.failures.push(times, Arc::new(make_error));
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.lock().unwrap().clone()
    }

    fn enter(&self, operation: &'static str) -> SchedulerResult<()> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        match self.failures.next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WorkerDirectory for MockWorkerDirectory {
    async fn register_worker(
        &self,
        _ctx: &CallContext,
        registration: &WorkerRegistration,
    ) -> SchedulerResult<WorkerInfo> {
        self.enter("register_worker")?;
        let mut workers = self.workers.lock().unwrap();
        if workers.iter().any(|w| w.id == registration.worker_id) {
            return Err(SchedulerError::WorkerAlreadyExists {
                id: registration.worker_id.clone(),
            });
        }

        let now = chrono::Utc::now();
        let info = WorkerInfo {
            id: registration.worker_id.clone(),
            address: registration.address.clone(),
            status: WorkerStatus::Active,
            capabilities: registration.capabilities.clone(),
            last_heartbeat: now,
            registered_at: now,
            current_load: 0,
            last_error: None,
        };
        workers.push(info.clone());
        Ok(info)
    }

    async fn get_worker(&self, _ctx: &CallContext, id: &str) -> SchedulerResult<WorkerInfo> {
        self.enter("get_worker")?;
        self.workers
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| SchedulerError::WorkerNotFound { id: id.to_string() })
    }

    async fn update_worker_status(
        &self,
        _ctx: &CallContext,
        id: &str,
        status: WorkerStatus,
    ) -> SchedulerResult<()> {
        self.enter("update_worker_status")?;
        let mut workers = self.workers.lock().unwrap();
        let worker = workers
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| SchedulerError::WorkerNotFound { id: id.to_string() })?;
        worker.status = status;
        Ok(())
    }

    async fn list_workers(&self, _ctx: &CallContext) -> SchedulerResult<Vec<WorkerInfo>> {
        self.enter("list_workers")?;
        Ok(self.workers())
    }

    async fn find_available_workers(
        &self,
        _ctx: &CallContext,
        capabilities: &BTreeSet<String>,
        _resources: &[ResourceRequirement],
    ) -> SchedulerResult<Vec<WorkerInfo>> {
        self.enter("find_available_workers")?;
        Ok(self
            .workers()
            .into_iter()
            .filter(|w| w.status == WorkerStatus::Active && w.has_all_capabilities(capabilities))
            .collect())
    }
}

/// Component double that counts lifecycle calls
///
/// When a shared journal is attached, each call appends `"start:<name>"` or
/// `"stop:<name>"` so tests can assert ordering across components.
#[derive(Clone)]
pub struct RecordingComponent {
    name: String,
    start_calls: Arc<AtomicUsize>,
    stop_calls: Arc<AtomicUsize>,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingComponent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start_calls: Arc::new(AtomicUsize::new(0)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
            fail_start: None,
            fail_stop: None,
            journal: None,
        }
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.fail_start = Some(message.to_string());
        self
    }

    pub fn failing_stop(mut self, message: &str) -> Self {
        self.fail_stop = Some(message.to_string());
        self
    }

    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn record(&self, action: &str) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(format!("{action}:{}", self.name));
        }
    }
}

#[async_trait]
impl Component for RecordingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _ctx: &CallContext) -> SchedulerResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.record("start");
        match &self.fail_start {
            Some(message) => Err(SchedulerError::Internal(message.clone())),
            None => Ok(()),
        }
    }

    async fn stop(&self, _ctx: &CallContext) -> SchedulerResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.record("stop");
        match &self.fail_stop {
            Some(message) => Err(SchedulerError::Internal(message.clone())),
            None => Ok(()),
        }
    }
}
