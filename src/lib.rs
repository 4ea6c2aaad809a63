pub mod app;
pub mod backend;
pub mod charts;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod stats;
pub mod storage;
pub mod state;
pub mod upstream;

pub use app::router;
pub use config::Config;
pub use gateway::Gateway;
pub use state::AppState;
pub use storage::CacheStorage;
