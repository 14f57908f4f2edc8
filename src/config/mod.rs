pub mod env;
mod loader;

pub use env::{
    AppConfig, ConfigError, CrawlerConfig, DirectoryConfig, MonitorConfig, RateConfig,
    SearchConfig, TorConfig,
};
pub use loader::load_config;
