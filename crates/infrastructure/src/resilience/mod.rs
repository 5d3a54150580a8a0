//! 远程调用弹性组件：限流、熔断与指数退避重试

pub mod caller;
pub mod circuit_breaker;
pub mod decorators;
pub mod rate_limiter;
pub mod retry;

pub use caller::ResilientCaller;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use decorators::{ResilientTaskStore, ResilientWorkerDirectory};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, RetryPredicate};
