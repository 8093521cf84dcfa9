use actix_web::{web, HttpResponse, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::responses::HttpResponseBuilder;
use crate::plugins::PluginHost;

/// 健康检查响应
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// 已注册的连接器数量
    pub connectors: usize,
    /// 活动会话数量
    pub live_sessions: usize,
    pub timestamp: DateTime<Utc>,
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "服务健康", body = HealthResponse)
    )
)]
pub async fn health_check(host: web::Data<PluginHost>) -> Result<HttpResponse> {
    HttpResponseBuilder::ok(HealthResponse {
        status: "healthy".to_string(),
        service: "data-fetch".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connectors: host.registry().len(),
        live_sessions: host.live_sessions(),
        timestamp: Utc::now(),
    })
}

/// 根路径处理器
pub async fn index() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "name": "Data Fetch",
        "version": env!("CARGO_PKG_VERSION"),
        "api": "/api/v1",
        "docs": "/api/v1/docs/",
        "health": "/health"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginsConfig;

    #[actix_web::test]
    async fn test_health_check() {
        let host = web::Data::new(PluginHost::new(&PluginsConfig::default()));
        let resp = health_check(host).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_index() {
        let resp = index().await.unwrap();
        assert_eq!(resp.status(), 200);
    }
}
