use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::gauge;
use parking_lot::RwLock;
use tracing::{debug, info};

use coordinator_core::{SchedulerError, SchedulerResult, WorkerInfo, WorkerStatus};

/// Worker的可变状态，受每个条目自己的锁保护
#[derive(Debug, Clone)]
struct WorkerState {
    status: WorkerStatus,
    last_heartbeat: DateTime<Utc>,
    current_load: u8,
    last_error: Option<String>,
}

/// 注册表中的一个Worker条目
///
/// 标识、地址与能力在注册后不再变化；状态、心跳、负载与错误信息的修改只获取
/// 该条目自己的锁，不会阻塞注册表的结构性操作。
#[derive(Debug)]
pub struct Worker {
    id: String,
    address: String,
    capabilities: BTreeSet<String>,
    registered_at: DateTime<Utc>,
    state: RwLock<WorkerState>,
}

impl Worker {
    pub fn new(id: impl Into<String>, address: impl Into<String>, capabilities: BTreeSet<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            address: address.into(),
            capabilities,
            registered_at: now,
            state: RwLock::new(WorkerState {
                status: WorkerStatus::Active,
                last_heartbeat: now,
                current_load: 0,
                last_error: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn has_all_capabilities(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.read().status
    }

    /// 设置状态并返回旧状态
    pub fn set_status(&self, status: WorkerStatus) -> WorkerStatus {
        std::mem::replace(&mut self.state.write().status, status)
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.state.read().last_heartbeat
    }

    pub fn current_load(&self) -> u8 {
        self.state.read().current_load
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    /// 记录一次心跳
    ///
    /// 心跳时间只会前进，较旧的时间戳被忽略。失活的Worker收到心跳后恢复为
    /// Active，此时返回恢复前的状态。
    pub fn record_heartbeat_at(&self, at: DateTime<Utc>) -> Option<WorkerStatus> {
        let mut state = self.state.write();
        if at > state.last_heartbeat {
            state.last_heartbeat = at;
        }

        if state.status == WorkerStatus::Inactive {
            state.status = WorkerStatus::Active;
            return Some(WorkerStatus::Inactive);
        }
        None
    }

    /// 心跳超时则标记为 Inactive，返回标记前的状态
    ///
    /// 检查与修改在同一次加锁内完成，与并发心跳之间不存在中间态。
    pub fn expire_if_stale(&self, now: DateTime<Utc>, timeout: ChronoDuration) -> Option<WorkerStatus> {
        let mut state = self.state.write();
        if state.status == WorkerStatus::Inactive {
            return None;
        }
        if now - state.last_heartbeat > timeout {
            let old = state.status;
            state.status = WorkerStatus::Inactive;
            return Some(old);
        }
        None
    }

    /// 更新负载，超过 100 的值按 100 处理
    pub fn set_load(&self, load: u8) {
        self.state.write().current_load = load.min(100);
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let mut state = self.state.write();
        state.status = WorkerStatus::Error;
        state.last_error = Some(message.into());
    }

    pub fn clear_error(&self) {
        let mut state = self.state.write();
        state.last_error = None;
        if state.status == WorkerStatus::Error {
            state.status = WorkerStatus::Active;
        }
    }

    pub fn snapshot(&self) -> WorkerInfo {
        let state = self.state.read().clone();
        WorkerInfo {
            id: self.id.clone(),
            address: self.address.clone(),
            status: state.status,
            capabilities: self.capabilities.clone(),
            last_heartbeat: state.last_heartbeat,
            registered_at: self.registered_at,
            current_load: state.current_load,
            last_error: state.last_error,
        }
    }
}

/// 一次服务发现对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Worker注册表
///
/// 注册与注销获取写锁，其余查询获取读锁后克隆出 `Arc<Worker>` 即释放。
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Arc<Worker>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        id: &str,
        address: &str,
        capabilities: BTreeSet<String>,
    ) -> SchedulerResult<Arc<Worker>> {
        let mut workers = self.workers.write();
        if workers.contains_key(id) {
            return Err(SchedulerError::WorkerAlreadyExists { id: id.to_string() });
        }

        let worker = Arc::new(Worker::new(id, address, capabilities));
        workers.insert(id.to_string(), worker.clone());
        gauge!("coordinator_registered_workers").set(workers.len() as f64);

        info!(worker_id = %id, address = %address, "Worker已注册");
        Ok(worker)
    }

    pub fn unregister(&self, id: &str) -> SchedulerResult<Arc<Worker>> {
        let mut workers = self.workers.write();
        let removed = workers
            .remove(id)
            .ok_or_else(|| SchedulerError::WorkerNotFound { id: id.to_string() })?;
        gauge!("coordinator_registered_workers").set(workers.len() as f64);

        info!(worker_id = %id, "Worker已注销");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> SchedulerResult<Arc<Worker>> {
        self.workers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::WorkerNotFound { id: id.to_string() })
    }

    /// 按 ID 排序返回所有Worker
    pub fn get_all(&self) -> Vec<Arc<Worker>> {
        let mut workers: Vec<Arc<Worker>> = self.workers.read().values().cloned().collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    pub fn get_by_status(&self, status: WorkerStatus) -> Vec<Arc<Worker>> {
        self.filtered(|w| w.status() == status)
    }

    pub fn get_by_capability(&self, capability: &str) -> Vec<Arc<Worker>> {
        self.filtered(|w| w.has_capability(capability))
    }

    /// 处于 Active 状态且具备全部所需能力的Worker
    pub fn get_available(&self, required_capabilities: &BTreeSet<String>) -> Vec<Arc<Worker>> {
        self.filtered(|w| {
            w.status() == WorkerStatus::Active && w.has_all_capabilities(required_capabilities)
        })
    }

    pub fn count(&self) -> usize {
        self.workers.read().len()
    }

    pub fn count_by_status(&self, status: WorkerStatus) -> usize {
        self.workers
            .read()
            .values()
            .filter(|w| w.status() == status)
            .count()
    }

    /// 将注册表与发现到的地址列表对齐
    ///
    /// 新地址以地址本身作为 ID 注册；地址不在列表中的Worker被注销。
    /// 整个对账在一次写锁内完成。
    pub fn reconcile(&self, addresses: &[String]) -> ReconcileOutcome {
        let listed: HashSet<&str> = addresses.iter().map(String::as_str).collect();
        let mut outcome = ReconcileOutcome::default();

        let mut workers = self.workers.write();
        let known: HashSet<String> = workers.values().map(|w| w.address.clone()).collect();

        workers.retain(|id, worker| {
            let keep = listed.contains(worker.address.as_str());
            if !keep {
                outcome.removed.push(id.clone());
            }
            keep
        });

        for address in addresses {
            if known.contains(address) || workers.contains_key(address) {
                continue;
            }
            workers.insert(
                address.clone(),
                Arc::new(Worker::new(address.as_str(), address.as_str(), BTreeSet::new())),
            );
            outcome.added.push(address.clone());
        }
        gauge!("coordinator_registered_workers").set(workers.len() as f64);
        drop(workers);

        outcome.added.sort();
        outcome.removed.sort();
        for id in &outcome.added {
            info!(worker_id = %id, "发现新Worker并注册");
        }
        for id in &outcome.removed {
            info!(worker_id = %id, "Worker已不在发现结果中，注销");
        }
        debug!(added = outcome.added.len(), removed = outcome.removed.len(), "注册表对账完成");
        outcome
    }

    fn filtered<F>(&self, predicate: F) -> Vec<Arc<Worker>>
    where
        F: Fn(&Worker) -> bool,
    {
        let mut workers: Vec<Arc<Worker>> = self
            .workers
            .read()
            .values()
            .filter(|w| predicate(w))
            .cloned()
            .collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }
}
