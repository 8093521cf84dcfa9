// 应用程序设置和配置
// 定义配置结构体和加载逻辑

use config::{Config, ConfigError, Environment, File};
use data_fetch_abi::CONNECTOR_API_VERSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::DataFetchError;

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub plugins: PluginsConfig,
    pub logging: LoggingConfig,
    pub environment: EnvironmentConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// 允许跨域访问的来源，为空时拒绝所有跨域请求，`*` 表示任意来源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// 插件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// 插件目录
    pub directory: String,
    /// 扫描时接受的动态库扩展名
    pub extensions: Vec<String>,
    /// 宿主支持的 ABI 版本
    pub api_version: u32,
    /// 最大插件大小（MB）
    pub max_plugin_size_mb: u64,
    /// 是否计算插件文件校验和
    pub compute_checksum: bool,
    /// 启动时是否加载插件目录
    pub load_on_startup: bool,
    /// 是否允许按路径加载插件目录之外的文件
    #[serde(default)]
    pub allow_external_paths: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_enabled: bool,
    pub file_path: Option<String>,
}

/// 环境配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    pub debug: bool,
    pub version: String,
}

impl AppConfig {
    /// 从环境变量和配置文件加载配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("config.toml"))
    }

    /// 从指定配置文件加载，文件不存在时只使用默认值和环境变量
    pub fn load_from(config_file: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::builder();

        // 1. 加载默认配置
        config = config.add_source(Config::try_from(&AppConfig::default())?);

        // 2. 尝试加载配置文件
        if config_file.exists() {
            config = config.add_source(File::from(config_file));
        }

        // 3. 加载环境变量（优先级最高）
        config = config.add_source(
            Environment::with_prefix("DATA_FETCH")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("plugins.extensions")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

        let config = config.build()?;
        let mut app_config: AppConfig = config.try_deserialize()?;

        app_config.environment.version = env!("CARGO_PKG_VERSION").to_string();

        Ok(app_config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<(), DataFetchError> {
        use crate::config::ConfigValidator;

        match ConfigValidator::validate_all(self) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                Err(DataFetchError::configuration(format!(
                    "配置验证失败: {}",
                    error_messages.join("; ")
                )))
            }
        }
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.environment.name == "development"
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment.name == "production"
    }

    /// 是否为测试环境
    pub fn is_test(&self) -> bool {
        self.environment.name == "test"
    }
}

impl PluginsConfig {
    /// 插件目录路径
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: "plugins/dll".to_string(),
            extensions: vec!["dll".to_string(), "so".to_string(), "dylib".to_string()],
            api_version: CONNECTOR_API_VERSION,
            max_plugin_size_mb: 100,
            compute_checksum: true,
            load_on_startup: true,
            allow_external_paths: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                workers: None,
                cors_origins: Vec::new(),
            },
            plugins: PluginsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "full".to_string(),
                file_enabled: false,
                file_path: None,
            },
            environment: EnvironmentConfig {
                name: "development".to_string(),
                debug: true,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}
