pub mod config;
pub mod dashboard;
pub mod error;
pub mod runner;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use runner::{JobRunner, JobTicket};
