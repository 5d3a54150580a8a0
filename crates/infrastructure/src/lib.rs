pub mod clients;
pub mod event_bus;
pub mod resilience;

pub use clients::*;
pub use event_bus::*;
pub use resilience::*;
