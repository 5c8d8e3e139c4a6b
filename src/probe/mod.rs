mod probe;
pub mod scheduler;

pub use probe::Probe;
pub use scheduler::{MIN_INTERVAL, Scheduler, UPDATE_INTERVAL};
