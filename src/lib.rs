pub mod config;
pub mod fetch;
pub mod process;

pub use config::Config;
