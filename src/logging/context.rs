// 日志上下文管理

use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

/// 操作上下文
///
/// 每个 HTTP 请求或 CLI 命令对应一个，作为 tracing span 的字段来源。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    pub operation_id: String,
    pub operation: String,
    pub plugin_id: Option<String>,
    pub session: Option<String>,
    pub request_id: Option<String>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl OperationContext {
    /// 创建新的操作上下文
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            operation: operation.into(),
            plugin_id: None,
            session: None,
            request_id: None,
            start_time: chrono::Utc::now(),
        }
    }

    /// 从 HTTP 请求创建上下文，沿用请求头中的请求 ID
    pub fn from_http_request(req: &actix_web::HttpRequest, operation: impl Into<String>) -> Self {
        let mut context = Self::new(operation);

        if let Some(request_id) = req
            .headers()
            .get("X-Request-ID")
            .and_then(|h| h.to_str().ok())
        {
            context.request_id = Some(request_id.to_string());
        }

        context
    }

    /// 设置插件 ID
    pub fn with_plugin_id(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    /// 设置会话句柄
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// 获取持续时间
    pub fn duration(&self) -> chrono::Duration {
        chrono::Utc::now() - self.start_time
    }

    /// 创建携带上下文字段的 span
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "operation",
            operation_id = %self.operation_id,
            operation = %self.operation,
            plugin_id = ?self.plugin_id,
            session = ?self.session,
            request_id = ?self.request_id,
        )
    }

    /// 记录操作完成
    pub fn finish(&self) {
        tracing::info!(
            operation_id = %self.operation_id,
            operation = %self.operation,
            duration_ms = self.duration().num_milliseconds(),
            "操作完成"
        );
    }

    /// 转换为日志字段
    pub fn to_log_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("operation_id", self.operation_id.clone()),
            ("operation", self.operation.clone()),
            ("start_time", self.start_time.to_rfc3339()),
        ];

        if let Some(ref plugin_id) = self.plugin_id {
            fields.push(("plugin_id", plugin_id.clone()));
        }

        if let Some(ref session) = self.session {
            fields.push(("session", session.clone()));
        }

        if let Some(ref request_id) = self.request_id {
            fields.push(("request_id", request_id.clone()));
        }

        fields
    }
}
