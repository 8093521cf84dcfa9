// 连接器管理 API 处理器

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::api::handlers::run_blocking;
use crate::api::responses::HttpResponseBuilder;
use crate::errors::DataFetchError;
use crate::logging::OperationContext;
use crate::plugins::{PluginHost, UnloadPolicy};

/// 加载插件请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoadConnectorRequest {
    /// 动态库路径，相对路径按插件目录解析
    pub path: String,
}

/// 卸载参数
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnloadQuery {
    /// 为 true 时先销毁剩余会话再卸载
    #[serde(default)]
    pub force: bool,
}

/// 卸载结果
#[derive(Debug, Serialize, ToSchema)]
pub struct UnloadResponse {
    pub plugin_id: String,
    /// 卸载时被销毁的会话数
    pub destroyed_sessions: usize,
}

/// 获取连接器列表
#[utoipa::path(
    get,
    path = "/connectors",
    tag = "Connector",
    responses(
        (status = 200, description = "已注册的连接器", body = [crate::plugins::ConnectorSummary])
    )
)]
pub async fn list_connectors(
    req: HttpRequest,
    host: web::Data<PluginHost>,
) -> Result<HttpResponse, DataFetchError> {
    let context = OperationContext::from_http_request(&req, "list_connectors");
    let host = host.into_inner();
    let summaries = run_blocking(&context, move || Ok(host.connector_summaries())).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(summaries, context.request_id))
}

/// 获取连接器详情
#[utoipa::path(
    get,
    path = "/connectors/{plugin_id}",
    tag = "Connector",
    params(("plugin_id" = String, Path, description = "插件 ID")),
    responses(
        (status = 200, description = "连接器详情", body = crate::plugins::ConnectorSummary),
        (status = 404, description = "插件不存在")
    )
)]
pub async fn get_connector(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    path: web::Path<String>,
) -> Result<HttpResponse, DataFetchError> {
    let plugin_id = path.into_inner();
    let context = OperationContext::from_http_request(&req, "get_connector").with_plugin_id(&plugin_id);
    let host = host.into_inner();
    let summary = run_blocking(&context, move || host.connector(&plugin_id)).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(summary, context.request_id))
}

/// 获取连接器配置项
#[utoipa::path(
    get,
    path = "/connectors/{plugin_id}/fields",
    tag = "Connector",
    params(("plugin_id" = String, Path, description = "插件 ID")),
    responses(
        (status = 200, description = "配置项定义", body = [crate::plugins::ConfigFieldSpec]),
        (status = 404, description = "插件不存在")
    )
)]
pub async fn get_config_fields(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    path: web::Path<String>,
) -> Result<HttpResponse, DataFetchError> {
    let plugin_id = path.into_inner();
    let context =
        OperationContext::from_http_request(&req, "get_config_fields").with_plugin_id(&plugin_id);
    let host = host.into_inner();
    let fields = run_blocking(&context, move || host.config_fields(&plugin_id)).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(fields, context.request_id))
}

/// 加载单个插件
#[utoipa::path(
    post,
    path = "/connectors",
    tag = "Connector",
    request_body = LoadConnectorRequest,
    responses(
        (status = 201, description = "插件已注册", body = crate::plugins::ConnectorDescriptor),
        (status = 404, description = "插件文件不存在"),
        (status = 409, description = "插件 ID 重复"),
        (status = 422, description = "插件无法加载或不兼容")
    )
)]
pub async fn load_connector(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    body: web::Json<LoadConnectorRequest>,
) -> Result<HttpResponse, DataFetchError> {
    let LoadConnectorRequest { path } = body.into_inner();
    let context = OperationContext::from_http_request(&req, "load_connector");
    debug!(path = %path, "请求加载插件");

    let host = host.into_inner();
    let descriptor = run_blocking(&context, move || host.load_plugin(&path)).await?;
    info!(plugin_id = %descriptor.id, "插件已通过 API 加载");

    Ok(HttpResponseBuilder::created_with_request_id(descriptor, context.request_id))
}

/// 扫描插件目录
#[utoipa::path(
    post,
    path = "/connectors/scan",
    tag = "Connector",
    responses(
        (status = 200, description = "扫描结果，单个文件失败不会中断扫描", body = crate::plugins::LoadReport)
    )
)]
pub async fn scan_connectors(
    req: HttpRequest,
    host: web::Data<PluginHost>,
) -> Result<HttpResponse, DataFetchError> {
    let context = OperationContext::from_http_request(&req, "scan_connectors");
    let host = host.into_inner();
    let report = run_blocking(&context, move || host.load_all()).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(report, context.request_id))
}

/// 卸载插件
#[utoipa::path(
    delete,
    path = "/connectors/{plugin_id}",
    tag = "Connector",
    params(
        ("plugin_id" = String, Path, description = "插件 ID"),
        UnloadQuery
    ),
    responses(
        (status = 200, description = "插件已卸载", body = UnloadResponse),
        (status = 404, description = "插件不存在"),
        (status = 409, description = "仍有活动会话")
    )
)]
pub async fn unload_connector(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    path: web::Path<String>,
    query: web::Query<UnloadQuery>,
) -> Result<HttpResponse, DataFetchError> {
    let plugin_id = path.into_inner();
    let policy = if query.force {
        UnloadPolicy::ForceDestroy
    } else {
        UnloadPolicy::Refuse
    };
    let context =
        OperationContext::from_http_request(&req, "unload_connector").with_plugin_id(&plugin_id);

    let host = host.into_inner();
    let id = plugin_id.clone();
    let destroyed_sessions = run_blocking(&context, move || host.unload_plugin(&id, policy)).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(
        UnloadResponse {
            plugin_id,
            destroyed_sessions,
        },
        context.request_id,
    ))
}

/// 配置连接器路由
pub fn configure_connector_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/connectors")
            .route("", web::get().to(list_connectors))
            .route("", web::post().to(load_connector))
            .route("/scan", web::post().to(scan_connectors))
            .route("/{plugin_id}", web::get().to(get_connector))
            .route("/{plugin_id}", web::delete().to(unload_connector))
            .route("/{plugin_id}/fields", web::get().to(get_config_fields)),
    );
}
