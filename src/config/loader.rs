// 配置加载器
// 处理配置文件加载和环境变量解析

use crate::config::AppConfig;
use crate::errors::DataFetchError;
use dotenvy::dotenv;
use std::sync::OnceLock;
use tracing::{info, warn};

/// 全局配置实例
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 初始化配置
    pub fn init() -> Result<&'static AppConfig, DataFetchError> {
        // 加载 .env 文件
        if let Err(e) = dotenv() {
            warn!("无法加载 .env 文件: {}", e);
        }

        let config = AppConfig::load()?;
        config.validate()?;

        let config = CONFIG.get_or_init(|| config);

        info!("配置加载成功");
        info!("环境: {}", config.environment.name);
        info!("版本: {}", config.environment.version);
        info!("插件目录: {}", config.plugins.directory);

        Ok(config)
    }

    /// 获取已初始化的配置
    pub fn get() -> Option<&'static AppConfig> {
        CONFIG.get()
    }

    /// 打印配置摘要
    pub fn print_summary(config: &AppConfig) {
        println!("=== Data Fetch 配置摘要 ===");
        println!("环境: {}", config.environment.name);
        println!("版本: {}", config.environment.version);
        println!("调试模式: {}", config.environment.debug);
        println!("服务器: {}:{}", config.server.host, config.server.port);
        println!("工作线程: {:?}", config.server.workers);
        println!("插件目录: {}", config.plugins.directory);
        println!("插件扩展名: {}", config.plugins.extensions.join(", "));
        println!("插件 API 版本: {}", config.plugins.api_version);
        println!("日志级别: {}", config.logging.level);
        println!("===========================");
    }
}
