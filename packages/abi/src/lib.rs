// Data Fetch 连接器 ABI
// 宿主与插件共享的二进制接口定义

pub mod types;
pub mod guest;

pub use types::*;
pub use guest::*;
