// 统一错误类型定义

use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

use thiserror::Error;
use tracing::error;

/// 插件宿主统一错误类型
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details")]
pub enum DataFetchError {
    /// 插件缺少必需的导出符号
    #[error("插件 {source_path} 缺少导出符号: {symbol}")]
    MissingExport { source_path: String, symbol: String },

    /// 插件 API 版本不兼容
    #[error("插件 {plugin_id} 的 API 版本不兼容，需要 {expected}，但提供了 {found}")]
    IncompatibleVersion { plugin_id: String, expected: u32, found: u32 },

    /// 插件 ID 重复
    #[error("插件 ID 已被占用: {plugin_id}")]
    DuplicateIdentifier { plugin_id: String },

    /// 会话配置被拒绝
    #[error("插件 {plugin_id} 拒绝了会话配置: {message}")]
    InvalidConfig { plugin_id: String, message: String },

    /// 使用已销毁或不存在的会话
    #[error("会话已销毁或从未创建: {handle}")]
    UseAfterDestroy { handle: String },

    /// 提取数据失败
    #[error("插件 {plugin_id} 提取数据失败 (会话 {handle})")]
    FetchFailed { plugin_id: String, handle: String },

    /// 连接测试失败
    #[error("插件 {plugin_id} 连接测试失败 (会话 {handle})")]
    TestFailed { plugin_id: String, handle: String },

    /// 动态库加载失败
    #[error("加载动态库 {path} 失败: {message}")]
    LibraryLoad { path: String, message: String },

    /// 插件返回了不符合约定的数据
    #[error("插件 {source_path} 数据不合法: {message}")]
    MalformedPlugin { source_path: String, message: String },

    /// 插件仍有活动会话，拒绝卸载
    #[error("插件 {plugin_id} 仍有 {live_sessions} 个活动会话")]
    PluginBusy { plugin_id: String, live_sessions: usize },

    /// 会话句柄格式错误
    #[error("无效的会话句柄: {handle}")]
    InvalidHandle { handle: String },

    /// 资源未找到
    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    /// 配置错误
    #[error("配置错误: {message}")]
    Configuration { message: String },

    /// 文件读写错误
    #[error("IO 错误: {message}")]
    Io { message: String },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal { message: String },
}

impl DataFetchError {
    /// 获取错误代码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingExport { .. } => "MISSING_EXPORT",
            Self::IncompatibleVersion { .. } => "INCOMPATIBLE_VERSION",
            Self::DuplicateIdentifier { .. } => "DUPLICATE_IDENTIFIER",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::UseAfterDestroy { .. } => "USE_AFTER_DESTROY",
            Self::FetchFailed { .. } => "FETCH_FAILED",
            Self::TestFailed { .. } => "TEST_FAILED",
            Self::LibraryLoad { .. } => "LIBRARY_LOAD_ERROR",
            Self::MalformedPlugin { .. } => "MALFORMED_PLUGIN",
            Self::PluginBusy { .. } => "PLUGIN_BUSY",
            Self::InvalidHandle { .. } => "INVALID_HANDLE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingExport { .. } => 422,
            Self::IncompatibleVersion { .. } => 422,
            Self::DuplicateIdentifier { .. } => 409,
            Self::InvalidConfig { .. } => 400,
            Self::UseAfterDestroy { .. } => 410,
            Self::FetchFailed { .. } => 502,
            Self::TestFailed { .. } => 502,
            Self::LibraryLoad { .. } => 422,
            Self::MalformedPlugin { .. } => 422,
            Self::PluginBusy { .. } => 409,
            Self::InvalidHandle { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Configuration { .. } => 500,
            Self::Io { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// 是否为加载期错误（只影响单个插件的注册）
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::MissingExport { .. }
                | Self::IncompatibleVersion { .. }
                | Self::DuplicateIdentifier { .. }
                | Self::LibraryLoad { .. }
                | Self::MalformedPlugin { .. }
        )
    }

    /// 是否为可重试的会话期错误
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::FetchFailed { .. } | Self::TestFailed { .. }
        )
    }

    /// 是否为宿主侧编程错误
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::UseAfterDestroy { .. })
    }

    /// 是否为客户端错误
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code(), 400..=499)
    }

    /// 是否为服务器错误
    pub fn is_server_error(&self) -> bool {
        matches!(self.status_code(), 500..=599)
    }

    /// 是否应该记录错误日志
    pub fn should_log(&self) -> bool {
        !matches!(
            self,
            Self::NotFound { .. } | Self::InvalidHandle { .. } | Self::InvalidConfig { .. }
        )
    }

    /// 创建缺少导出错误
    pub fn missing_export(source_path: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self::MissingExport {
            source_path: source_path.into(),
            symbol: symbol.into(),
        }
    }

    /// 创建版本不兼容错误
    pub fn incompatible_version(plugin_id: impl Into<String>, expected: u32, found: u32) -> Self {
        Self::IncompatibleVersion {
            plugin_id: plugin_id.into(),
            expected,
            found,
        }
    }

    /// 创建 ID 重复错误
    pub fn duplicate_identifier(plugin_id: impl Into<String>) -> Self {
        Self::DuplicateIdentifier {
            plugin_id: plugin_id.into(),
        }
    }

    /// 创建配置被拒绝错误
    pub fn invalid_config(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }

    /// 创建会话已销毁错误
    pub fn use_after_destroy(handle: impl Into<String>) -> Self {
        Self::UseAfterDestroy {
            handle: handle.into(),
        }
    }

    /// 创建提取失败错误
    pub fn fetch_failed(plugin_id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self::FetchFailed {
            plugin_id: plugin_id.into(),
            handle: handle.into(),
        }
    }

    /// 创建连接测试失败错误
    pub fn test_failed(plugin_id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self::TestFailed {
            plugin_id: plugin_id.into(),
            handle: handle.into(),
        }
    }

    /// 创建动态库加载错误
    pub fn library_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LibraryLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 创建插件数据不合法错误
    pub fn malformed_plugin(source_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedPlugin {
            source_path: source_path.into(),
            message: message.into(),
        }
    }

    /// 创建插件忙错误
    pub fn plugin_busy(plugin_id: impl Into<String>, live_sessions: usize) -> Self {
        Self::PluginBusy {
            plugin_id: plugin_id.into(),
            live_sessions,
        }
    }

    /// 创建无效句柄错误
    pub fn invalid_handle(handle: impl Into<String>) -> Self {
        Self::InvalidHandle {
            handle: handle.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// 创建 IO 错误
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// 实现 ResponseError trait 以便与 Actix Web 集成
impl ResponseError for DataFetchError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if self.should_log() {
            error!(
                error_code = %self.error_code(),
                error_message = %self,
                "处理请求时发生错误"
            );
        }

        crate::errors::ErrorResponse::from_error(self).into_http_response()
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for DataFetchError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration(format!("配置加载错误: {}", err))
    }
}

/// 从 std::io::Error 转换
impl From<std::io::Error> for DataFetchError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found("文件或目录"),
            _ => Self::io(err.to_string()),
        }
    }
}

/// 从 serde_json::Error 转换
impl From<serde_json::Error> for DataFetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON 序列化错误: {}", err))
    }
}

/// 从 actix_web::error::BlockingError 转换
impl From<actix_web::error::BlockingError> for DataFetchError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        Self::internal(format!("阻塞任务执行失败: {}", err))
    }
}
