pub mod config;
pub mod consumer;
pub mod dedup;
pub mod error;
pub mod event;
pub mod flush;
pub mod kinesis;
pub mod metrics_consts;
pub mod orchestrator;
pub mod processor;
pub mod sink;
pub mod source;
pub mod store;
pub mod test_utils;
