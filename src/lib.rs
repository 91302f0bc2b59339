pub mod camera;
pub mod config;
pub mod notify;
pub mod store;
pub mod watch;

pub use config::WatchConfig;
pub use watch::loop_worker::{watch_loop, Watcher};
