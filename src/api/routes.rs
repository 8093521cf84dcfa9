// API 路由定义
// 定义所有 API 端点的路由配置

use actix_cors::Cors;
use actix_web::{web, HttpResponse, Result as ActixResult};
use utoipa::OpenApi;

use crate::api::handlers::{connectors, sessions};
use crate::api::responses::HttpResponseBuilder;
use crate::config::ServerConfig;
use crate::health;

/// API 文档聚合
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Data Fetch API",
        description = "数据连接器插件宿主 API 接口文档",
        version = "1.0.0",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        health::health_check,
        connectors::list_connectors,
        connectors::get_connector,
        connectors::get_config_fields,
        connectors::load_connector,
        connectors::scan_connectors,
        connectors::unload_connector,
        sessions::create_session,
        sessions::list_sessions,
        sessions::get_session,
        sessions::test_session,
        sessions::fetch_session_data,
        sessions::destroy_session,
    ),
    components(schemas(
        health::HealthResponse,
        crate::plugins::ConnectorDescriptor,
        crate::plugins::ConnectorSummary,
        crate::plugins::ConfigFieldSpec,
        crate::plugins::PluginSource,
        crate::plugins::LoadReport,
        crate::plugins::LoadFailure,
        crate::plugins::UnloadPolicy,
        crate::plugins::SessionInfo,
        crate::plugins::SessionState,
        connectors::LoadConnectorRequest,
        connectors::UnloadResponse,
        sessions::CreateSessionRequest,
        sessions::SessionCreated,
        sessions::ConnectionTestResponse,
        sessions::FetchDataResponse,
        sessions::SessionDestroyed,
    )),
    tags(
        (name = "Health", description = "健康检查相关接口"),
        (name = "Connector", description = "连接器加载与查询相关接口"),
        (name = "Session", description = "会话生命周期相关接口"),
    )
)]
pub struct ApiDoc;

/// 根路径处理器
async fn api_root() -> ActixResult<HttpResponse> {
    let info = serde_json::json!({
        "name": "Data Fetch API",
        "version": env!("CARGO_PKG_VERSION"),
        "documentation": "/api/v1/docs/",
        "timestamp": chrono::Utc::now(),
        "endpoints": {
            "health": "/api/v1/health",
            "connectors": "/api/v1/connectors",
            "sessions": "/api/v1/sessions",
            "openapi": "/api/v1/openapi.json"
        }
    });

    HttpResponseBuilder::ok(info)
}

/// 配置 API 路由
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api").service(
            web::scope("/v1")
                .route("", web::get().to(api_root))
                .route("/health", web::get().to(health::health_check))
                .configure(connectors::configure_connector_routes)
                .configure(sessions::configure_session_routes)
                .route("/openapi.json", web::get().to(get_openapi_spec)),
        ),
    );
}

/// 获取 OpenAPI 规范
async fn get_openapi_spec() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiDoc::openapi()))
}

/// 配置 Swagger UI
pub fn configure_swagger_ui(cfg: &mut web::ServiceConfig) {
    cfg.service(
        utoipa_swagger_ui::SwaggerUi::new("/api/v1/docs/{_:.*}")
            .url("/api/v1/openapi.json", ApiDoc::openapi()),
    );
}

/// 配置所有 API 路由
pub fn configure_all(cfg: &mut web::ServiceConfig) {
    configure_routes(cfg);
    configure_swagger_ui(cfg);
}

/// 按配置构建 CORS 策略
///
/// 只放行 `cors_origins` 中列出的来源，不匹配的请求直接返回 400。
/// 列表为空时拒绝所有带 `Origin` 的请求，需要放开时显式配置 `*`。
pub fn cors_policy(config: &ServerConfig) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .block_on_origin_mismatch(true)
        .max_age(3600);

    if config.cors_origins.iter().any(|origin| origin == "*") {
        return cors.allow_any_origin();
    }

    config
        .cors_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}
