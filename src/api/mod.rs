// API 模块
// 插件宿主的 HTTP 接口

pub mod handlers;
pub mod responses;
pub mod routes;


pub use responses::*;
pub use routes::*;
