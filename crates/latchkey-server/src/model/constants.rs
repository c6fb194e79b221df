// Configuration keys and defaults

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const ENV_PREFIX: &str = "LATCHKEY";
pub const ENV_SEPARATOR: &str = "__";

pub const SERVER_ADDRESS_PROPERTY: &str = "server.address";
pub const SERVER_PORT_PROPERTY: &str = "server.port";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 3000;

pub const NODES_PROPERTY: &str = "nodes";
pub const LOCK_PROPERTY: &str = "lock";
/// Node used when no endpoint is configured
pub const STANDALONE_NODE: &str = "memory://standalone";

pub const LOGGING_DIR_PROPERTY: &str = "logging.dir";
pub const LOGGING_LEVEL_PROPERTY: &str = "logging.level";
pub const LOGGING_CONSOLE_PROPERTY: &str = "logging.console";
pub const LOGGING_FILE_PROPERTY: &str = "logging.file";
/// `daily`, `hourly` or `never`
pub const LOGGING_ROTATION_PROPERTY: &str = "logging.rotation";
