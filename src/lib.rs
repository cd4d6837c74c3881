pub mod config;
pub mod export;
pub mod history_fetch;
pub mod http_client;
pub mod ingest;
pub mod match_fetch;
pub mod metrics;
pub mod normalize;
pub mod pool;
pub mod records;
pub mod state;
pub mod store;
pub mod views;
