pub mod history;
pub mod metrics;
pub mod worker;
pub mod workload;
