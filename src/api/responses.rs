// 统一 API 响应
// 成功响应在此构建，错误响应由 DataFetchError 的 ResponseError 实现生成

use actix_web::{HttpResponse, Result as ActixResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 统一 API 响应结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 是否成功
    pub success: bool,
    /// 响应数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// 请求 ID
    pub request_id: String,
    /// 响应时间戳
    pub timestamp: DateTime<Utc>,
    /// API 版本
    pub version: String,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            request_id: generate_request_id(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 沿用调用方传入的请求 ID
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(request_id) = request_id {
            self.request_id = request_id;
        }
        self
    }
}

/// HTTP 响应构建器
pub struct HttpResponseBuilder;

impl HttpResponseBuilder {
    /// 创建 200 OK 响应
    pub fn ok<T: Serialize>(data: T) -> ActixResult<HttpResponse> {
        Ok(HttpResponse::Ok().json(ApiResponse::ok(data)))
    }

    /// 创建 201 Created 响应
    pub fn created<T: Serialize>(data: T) -> ActixResult<HttpResponse> {
        Ok(HttpResponse::Created().json(ApiResponse::ok(data)))
    }

    /// 带请求 ID 的 200 OK 响应
    pub fn ok_with_request_id<T: Serialize>(data: T, request_id: Option<String>) -> HttpResponse {
        HttpResponse::Ok().json(ApiResponse::ok(data).with_request_id(request_id))
    }

    /// 带请求 ID 的 201 Created 响应
    pub fn created_with_request_id<T: Serialize>(data: T, request_id: Option<String>) -> HttpResponse {
        HttpResponse::Created().json(ApiResponse::ok(data).with_request_id(request_id))
    }
}

/// 生成请求 ID
fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
