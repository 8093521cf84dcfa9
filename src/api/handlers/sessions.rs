// 会话管理 API 处理器
// 路径中的句柄使用文本形式 plugin_id:index:generation

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use utoipa::ToSchema;

use crate::api::handlers::run_blocking;
use crate::api::responses::HttpResponseBuilder;
use crate::errors::DataFetchError;
use crate::logging::OperationContext;
use crate::plugins::{PluginHost, SessionHandle};

/// 创建会话请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    /// 插件 ID
    pub plugin_id: String,
    /// 会话配置，键必须是插件声明的配置项，值为字符串
    #[serde(default = "empty_config")]
    #[schema(value_type = Object)]
    pub config: Value,
}

fn empty_config() -> Value {
    Value::Object(Default::default())
}

/// 创建会话结果
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionCreated {
    pub handle: String,
    pub plugin_id: String,
}

/// 连接测试结果
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionTestResponse {
    pub handle: String,
    pub connected: bool,
}

/// 数据提取结果
#[derive(Debug, Serialize, ToSchema)]
pub struct FetchDataResponse {
    pub handle: String,
    /// 插件输出；不是合法 JSON 时按字符串返回
    #[schema(value_type = Object)]
    pub data: Value,
    /// 插件输出的字节数
    pub size_bytes: usize,
}

/// 销毁会话结果
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDestroyed {
    pub handle: String,
    pub destroyed: bool,
}

/// 创建会话
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "Session",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "会话已创建", body = SessionCreated),
        (status = 400, description = "配置无效或插件拒绝创建会话"),
        (status = 404, description = "插件不存在")
    )
)]
pub async fn create_session(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    body: web::Json<CreateSessionRequest>,
) -> Result<HttpResponse, DataFetchError> {
    let CreateSessionRequest { plugin_id, config } = body.into_inner();
    let context =
        OperationContext::from_http_request(&req, "create_session").with_plugin_id(&plugin_id);

    let host = host.into_inner();
    let id = plugin_id.clone();
    let handle = run_blocking(&context, move || host.create_session(&id, &config)).await?;
    debug!(handle = %handle, "会话已创建");

    Ok(HttpResponseBuilder::created_with_request_id(
        SessionCreated {
            handle: handle.to_string(),
            plugin_id,
        },
        context.request_id,
    ))
}

/// 获取会话列表
#[utoipa::path(
    get,
    path = "/sessions",
    tag = "Session",
    responses(
        (status = 200, description = "所有活动会话", body = [crate::plugins::SessionInfo])
    )
)]
pub async fn list_sessions(
    req: HttpRequest,
    host: web::Data<PluginHost>,
) -> Result<HttpResponse, DataFetchError> {
    let context = OperationContext::from_http_request(&req, "list_sessions");
    let host = host.into_inner();
    let sessions = run_blocking(&context, move || Ok(host.list_sessions())).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(sessions, context.request_id))
}

/// 获取会话详情
#[utoipa::path(
    get,
    path = "/sessions/{handle}",
    tag = "Session",
    params(("handle" = String, Path, description = "会话句柄")),
    responses(
        (status = 200, description = "会话详情", body = crate::plugins::SessionInfo),
        (status = 400, description = "句柄格式错误"),
        (status = 410, description = "会话已销毁")
    )
)]
pub async fn get_session(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    path: web::Path<String>,
) -> Result<HttpResponse, DataFetchError> {
    let handle: SessionHandle = path.into_inner().parse()?;
    let context = session_context(&req, "get_session", &handle);

    let host = host.into_inner();
    let info = run_blocking(&context, move || host.session_info(&handle)).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(info, context.request_id))
}

/// 测试会话连接
#[utoipa::path(
    post,
    path = "/sessions/{handle}/test",
    tag = "Session",
    params(("handle" = String, Path, description = "会话句柄")),
    responses(
        (status = 200, description = "连接测试结果", body = ConnectionTestResponse),
        (status = 400, description = "句柄格式错误"),
        (status = 410, description = "会话已销毁")
    )
)]
pub async fn test_session(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    path: web::Path<String>,
) -> Result<HttpResponse, DataFetchError> {
    let handle: SessionHandle = path.into_inner().parse()?;
    let context = session_context(&req, "test_connect", &handle);
    let text = handle.to_string();

    let host = host.into_inner();
    let connected = run_blocking(&context, move || host.test_connect(&handle)).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(
        ConnectionTestResponse {
            handle: text,
            connected,
        },
        context.request_id,
    ))
}

/// 提取会话数据
#[utoipa::path(
    get,
    path = "/sessions/{handle}/data",
    tag = "Session",
    params(("handle" = String, Path, description = "会话句柄")),
    responses(
        (status = 200, description = "插件输出", body = FetchDataResponse),
        (status = 400, description = "句柄格式错误"),
        (status = 410, description = "会话已销毁"),
        (status = 502, description = "插件提取失败")
    )
)]
pub async fn fetch_session_data(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    path: web::Path<String>,
) -> Result<HttpResponse, DataFetchError> {
    let handle: SessionHandle = path.into_inner().parse()?;
    let context = session_context(&req, "fetch_data", &handle);
    let text = handle.to_string();

    let host = host.into_inner();
    let payload = run_blocking(&context, move || host.fetch_data(&handle)).await?;
    let size_bytes = payload.len();
    let data = serde_json::from_str(&payload).unwrap_or(Value::String(payload));

    Ok(HttpResponseBuilder::ok_with_request_id(
        FetchDataResponse {
            handle: text,
            data,
            size_bytes,
        },
        context.request_id,
    ))
}

/// 销毁会话
#[utoipa::path(
    delete,
    path = "/sessions/{handle}",
    tag = "Session",
    params(("handle" = String, Path, description = "会话句柄")),
    responses(
        (status = 200, description = "会话已销毁", body = SessionDestroyed),
        (status = 400, description = "句柄格式错误"),
        (status = 410, description = "会话已销毁")
    )
)]
pub async fn destroy_session(
    req: HttpRequest,
    host: web::Data<PluginHost>,
    path: web::Path<String>,
) -> Result<HttpResponse, DataFetchError> {
    let handle: SessionHandle = path.into_inner().parse()?;
    let context = session_context(&req, "destroy_session", &handle);
    let text = handle.to_string();

    let host = host.into_inner();
    run_blocking(&context, move || host.destroy_session(handle)).await?;

    Ok(HttpResponseBuilder::ok_with_request_id(
        SessionDestroyed {
            handle: text,
            destroyed: true,
        },
        context.request_id,
    ))
}

fn session_context(req: &HttpRequest, operation: &str, handle: &SessionHandle) -> OperationContext {
    OperationContext::from_http_request(req, operation)
        .with_plugin_id(handle.plugin_id())
        .with_session(handle.to_string())
}

/// 配置会话路由
pub fn configure_session_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sessions")
            .route("", web::get().to(list_sessions))
            .route("", web::post().to(create_session))
            .route("/{handle}", web::get().to(get_session))
            .route("/{handle}", web::delete().to(destroy_session))
            .route("/{handle}/test", web::post().to(test_session))
            .route("/{handle}/data", web::get().to(fetch_session_data)),
    );
}
