// 错误处理模块
// 定义统一的错误类型和处理逻辑

pub mod response;
pub mod types;


pub use response::*;
pub use types::*;

/// 插件宿主统一结果类型
pub type DataFetchResult<T> = Result<T, DataFetchError>;
