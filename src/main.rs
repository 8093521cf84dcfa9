use actix_web::{web, App, HttpServer};

use data_fetch::api::routes;
use data_fetch::config::ConfigLoader;
use data_fetch::health;
use data_fetch::logging::LoggingSetup;
use data_fetch::plugins::PluginHost;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // 初始化配置
    let config = ConfigLoader::init()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    // 初始化结构化日志系统，guard 需持有到进程退出
    let _log_guard = LoggingSetup::init(&config.logging)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    tracing::info!("🚀 启动 Data Fetch v{}", config.environment.version);

    // 创建插件宿主并加载插件目录
    let host = web::Data::new(PluginHost::new(&config.plugins));
    if config.plugins.load_on_startup {
        let scan_host = host.clone().into_inner();
        match web::block(move || scan_host.load_all()).await {
            Ok(Ok(report)) => tracing::info!(
                loaded = report.loaded.len(),
                failed = report.failed.len(),
                "启动时插件加载完成"
            ),
            Ok(Err(e)) => tracing::warn!("插件目录扫描失败: {}", e),
            Err(e) => tracing::warn!("插件目录扫描任务失败: {}", e),
        }
    }

    // 打印配置摘要
    if config.environment.debug {
        ConfigLoader::print_summary(config);
    }

    tracing::info!("🌐 服务器启动地址: http://{}:{}", config.server.host, config.server.port);
    tracing::info!("📋 API 文档: http://{}:{}/api/v1/docs/", config.server.host, config.server.port);

    let server_config = config.server.clone();
    let app_host = host.clone();

    // 启动 HTTP 服务器
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(routes::cors_policy(&server_config))
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(app_host.clone())
            .route("/", web::get().to(health::index))
            .route("/health", web::get().to(health::health_check))
            .configure(routes::configure_all)
    });

    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    let result = server
        .bind((config.server.host.clone(), config.server.port))?
        .run()
        .await;

    // 服务器停止后先销毁会话再卸载插件
    host.shutdown();

    result
}
