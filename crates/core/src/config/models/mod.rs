pub mod app_config;
pub mod cluster;
pub mod event_bus;
pub mod observability;
pub mod resilience;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use cluster::{DiscoveryConfig, RegistryConfig, RunnerConfig, SchedulerConfig};
pub use event_bus::{EventBusConfig, TopicConfig, TransportKind};
pub use observability::{LogFormat, LoggingConfig};
pub use resilience::{CircuitBreakerConfig, RateLimitConfig, ResilienceConfig, RetryConfig};
