//! Misc utilities.

mod log_limiter;
mod lr_scheduler;

pub use log_limiter::*;
pub use lr_scheduler::*;
