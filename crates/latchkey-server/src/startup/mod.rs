//! Application startup utilities module.

mod http;
mod logging;
mod metrics;
mod nodes;
mod shutdown;

pub use http::main_server;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use self::metrics::init_metrics;
pub use nodes::{build_lock_service, build_nodes};
pub use shutdown::{run_until_shutdown, wait_for_shutdown_signal};
