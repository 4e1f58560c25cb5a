pub mod pipeline;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod store;
