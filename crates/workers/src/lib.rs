pub mod alert;
pub mod api;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod notifier;
pub mod poller;
pub mod shutdown;
pub mod storage;
pub mod test_harness;
