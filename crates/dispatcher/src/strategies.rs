use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use coordinator_core::{SchedulerError, SchedulerResult, SubTask, Task, WorkerInfo};

/// Worker选择策略
///
/// `rank` 返回按偏好排序的候选列表：单任务分配取第一个，子任务按该顺序轮流分配。
pub trait WorkerSelectionStrategy: Send + Sync {
    fn rank(&self, task: &Task, candidates: &[WorkerInfo]) -> Vec<WorkerInfo>;

    fn select_worker(&self, task: &Task, candidates: &[WorkerInfo]) -> Option<WorkerInfo> {
        self.rank(task, candidates).into_iter().next()
    }

    fn name(&self) -> &str;
}

/// 任务拆分策略
pub trait TaskDivisionStrategy: Send + Sync {
    fn divide(&self, task: &Task) -> Vec<SubTask>;

    fn name(&self) -> &str;
}

pub struct LeastLoadedStrategy;

impl LeastLoadedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastLoadedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSelectionStrategy for LeastLoadedStrategy {
    fn rank(&self, _task: &Task, candidates: &[WorkerInfo]) -> Vec<WorkerInfo> {
        let mut ranked = candidates.to_vec();
        // 负载相同按 ID 排序，保证结果稳定
        ranked.sort_by(|a, b| a.current_load.cmp(&b.current_load).then_with(|| a.id.cmp(&b.id)));

        if let Some(first) = ranked.first() {
            debug!(
                "负载均衡策略选择Worker: {} (负载: {}%)",
                first.id, first.current_load
            );
        }
        ranked
    }

    fn name(&self) -> &str {
        "least_loaded"
    }
}

pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSelectionStrategy for RoundRobinStrategy {
    fn rank(&self, _task: &Task, candidates: &[WorkerInfo]) -> Vec<WorkerInfo> {
        if candidates.is_empty() {
            debug!("没有可用的Worker节点");
            return Vec::new();
        }

        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| a.id.cmp(&b.id));
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % ranked.len();
        ranked.rotate_left(index);

        debug!(
            "轮询策略选择Worker: {} (索引: {}/{})",
            ranked[0].id,
            index,
            ranked.len()
        );
        ranked
    }

    fn name(&self) -> &str {
        "round_robin"
    }
}

/// 不拆分，整个任务交给一个Worker
pub struct NoDivision;

impl TaskDivisionStrategy for NoDivision {
    fn divide(&self, _task: &Task) -> Vec<SubTask> {
        Vec::new()
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// 拆成固定数量的分片，分片序号写入子任务输入的 `partition` / `partitions`
pub struct FixedPartitions {
    partitions: usize,
}

impl FixedPartitions {
    pub fn new(partitions: usize) -> Self {
        Self { partitions }
    }
}

impl TaskDivisionStrategy for FixedPartitions {
    fn divide(&self, task: &Task) -> Vec<SubTask> {
        (0..self.partitions)
            .map(|index| {
                let mut subtask = SubTask::new(task, format!("{}-part-{}", task.name, index));
                subtask.input.insert("partition".to_string(), index.to_string());
                subtask
                    .input
                    .insert("partitions".to_string(), self.partitions.to_string());
                subtask
            })
            .collect()
    }

    fn name(&self) -> &str {
        "fixed_partitions"
    }
}

/// 按配置名称创建选择策略
pub fn selection_strategy_from_name(name: &str) -> SchedulerResult<Arc<dyn WorkerSelectionStrategy>> {
    match name {
        "least_loaded" => Ok(Arc::new(LeastLoadedStrategy::new())),
        "round_robin" => Ok(Arc::new(RoundRobinStrategy::new())),
        other => Err(SchedulerError::Configuration(format!(
            "未知的Worker选择策略: {other}"
        ))),
    }
}
