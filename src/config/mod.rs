// 配置管理模块
// 处理应用程序配置和环境变量

pub mod loader;
pub mod settings;
pub mod validator;

#[cfg(test)]
mod tests;

pub use loader::*;
pub use settings::*;
pub use validator::*;
