#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and timing primitives for the build traffic light.

pub mod api;
pub mod clock;
pub mod elapsed;
pub mod error;
pub mod generation;
pub mod model;
pub mod schedule;

pub use clock::{now_ms, Clock, ManualClock, SystemClock};
pub use error::{ConfigError, TransportError};
pub use generation::Generation;
pub use schedule::{Scheduler, TimerHandle, TokioScheduler};
