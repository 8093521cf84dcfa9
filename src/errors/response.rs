// 错误响应格式化

use crate::errors::DataFetchError;
use actix_web::HttpResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 错误响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
}

/// 错误详情
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub status: u16,
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// 从 DataFetchError 创建错误响应
    pub fn from_error(error: &DataFetchError) -> Self {
        // 根据错误类型设置详细信息
        let details = match error {
            DataFetchError::MissingExport { source_path, symbol } => {
                Some(serde_json::json!({ "path": source_path, "symbol": symbol }))
            }
            DataFetchError::IncompatibleVersion {
                plugin_id,
                expected,
                found,
            } => Some(serde_json::json!({
                "plugin_id": plugin_id,
                "expected": expected,
                "found": found,
            })),
            DataFetchError::DuplicateIdentifier { plugin_id }
            | DataFetchError::InvalidConfig { plugin_id, .. } => {
                Some(serde_json::json!({ "plugin_id": plugin_id }))
            }
            DataFetchError::FetchFailed { plugin_id, handle }
            | DataFetchError::TestFailed { plugin_id, handle } => {
                Some(serde_json::json!({ "plugin_id": plugin_id, "handle": handle }))
            }
            DataFetchError::UseAfterDestroy { handle } | DataFetchError::InvalidHandle { handle } => {
                Some(serde_json::json!({ "handle": handle }))
            }
            DataFetchError::PluginBusy {
                plugin_id,
                live_sessions,
            } => Some(serde_json::json!({
                "plugin_id": plugin_id,
                "live_sessions": live_sessions,
            })),
            DataFetchError::LibraryLoad { path, .. } => Some(serde_json::json!({ "path": path })),
            DataFetchError::MalformedPlugin { source_path, .. } => {
                Some(serde_json::json!({ "path": source_path }))
            }
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetail {
                code: error.error_code().to_string(),
                message: error.to_string(),
                status: error.status_code(),
                details,
            },
            timestamp: Utc::now(),
            request_id: None,
        }
    }

    /// 设置请求 ID
    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// 转换为 HTTP 响应
    pub fn into_http_response(self) -> HttpResponse {
        let mut response = HttpResponse::build(
            actix_web::http::StatusCode::from_u16(self.error.status)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
        );

        // 添加请求 ID 头
        if let Some(ref request_id) = self.request_id {
            response.insert_header(("X-Request-ID", request_id.clone()));
        }

        response.json(self)
    }

    /// 创建通用错误响应
    pub fn generic_error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message: message.into(),
                status: 500,
                details: None,
            },
            timestamp: Utc::now(),
            request_id: None,
        }
    }
}
