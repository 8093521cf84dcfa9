// Data Fetch Library
// 导出主要模块供二进制和测试使用

pub mod api;
pub mod config;
pub mod errors;
pub mod health;
pub mod logging;
pub mod plugins;

pub use errors::{DataFetchError, DataFetchResult};
pub use plugins::PluginHost;
