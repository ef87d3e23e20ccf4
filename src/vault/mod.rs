pub mod audit;
pub mod config;
pub mod fingerprint;
pub mod ingest;
pub mod lock;
pub mod paths;
pub mod reconcile;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod transcript;
pub mod util;
