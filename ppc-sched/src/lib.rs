pub mod alarm;
pub mod fiber;
pub mod scheduler;
pub mod worker;

pub use alarm::AlarmService;
pub use fiber::Fiber;
pub use scheduler::{Scheduler, NUM_CORES};
pub use worker::WorkerPool;
