//! Platform abstraction layer
//!
//! This module isolates every hardware expectation of the core behind
//! narrow traits: a monotonic tick source, a free-running measurement
//! counter and a byte transport. Real firmware supplies register-level
//! implementations; the `mock` module supplies in-memory ones for host
//! tests.

pub mod error;
pub mod mock;
pub mod traits;

// Re-export commonly used types
pub use error::{PlatformError, Result};
pub use traits::{CounterInterface, TimerInterface, UartInterface};
