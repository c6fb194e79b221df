pub mod config;
pub mod constants;
pub mod response;

pub use self::config::Configuration;
