// 配置验证器
// 提供详细的配置验证逻辑

use crate::config::{AppConfig, EnvironmentConfig, LoggingConfig, PluginsConfig, ServerConfig};
use crate::errors::DataFetchError;

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证完整配置，收集所有问题
    pub fn validate_all(config: &AppConfig) -> Result<(), Vec<DataFetchError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_server(&config.server) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_plugins(&config.plugins) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_logging(&config.logging) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_environment(&config.environment) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 验证服务器配置
    pub fn validate_server(config: &ServerConfig) -> Result<(), DataFetchError> {
        if config.port == 0 {
            return Err(DataFetchError::configuration("服务器端口不能为 0"));
        }

        if config.host.is_empty() {
            return Err(DataFetchError::configuration("服务器主机地址不能为空"));
        }

        if config.workers == Some(0) {
            return Err(DataFetchError::configuration("工作线程数不能为 0"));
        }

        Ok(())
    }

    /// 验证插件配置
    pub fn validate_plugins(config: &PluginsConfig) -> Result<(), DataFetchError> {
        if config.directory.trim().is_empty() {
            return Err(DataFetchError::configuration("插件目录不能为空"));
        }

        if config.extensions.is_empty() {
            return Err(DataFetchError::configuration("插件扩展名列表不能为空"));
        }

        if config.extensions.iter().any(|ext| ext.trim().is_empty()) {
            return Err(DataFetchError::configuration("插件扩展名不能为空字符串"));
        }

        if config.api_version == 0 {
            return Err(DataFetchError::configuration("插件 API 版本不能为 0"));
        }

        if config.max_plugin_size_mb == 0 {
            return Err(DataFetchError::configuration("最大插件大小不能为 0"));
        }

        Ok(())
    }

    /// 验证日志配置
    pub fn validate_logging(config: &LoggingConfig) -> Result<(), DataFetchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.level.to_lowercase().as_str()) {
            return Err(DataFetchError::configuration(format!(
                "无效的日志级别: {}，有效值: {:?}",
                config.level, valid_levels
            )));
        }

        let valid_formats = ["json", "pretty", "compact", "full"];
        if !valid_formats.contains(&config.format.as_str()) {
            return Err(DataFetchError::configuration(format!(
                "无效的日志格式: {}，有效值: {:?}",
                config.format, valid_formats
            )));
        }

        if config.file_enabled && config.file_path.as_deref().is_none_or(str::is_empty) {
            return Err(DataFetchError::configuration("启用文件日志时必须指定日志文件路径"));
        }

        Ok(())
    }

    /// 验证环境配置
    pub fn validate_environment(config: &EnvironmentConfig) -> Result<(), DataFetchError> {
        let valid_environments = ["development", "staging", "production", "test"];
        if !valid_environments.contains(&config.name.as_str()) {
            return Err(DataFetchError::configuration(format!(
                "无效的环境名称: {}，有效值: {:?}",
                config.name, valid_environments
            )));
        }

        if config.version.is_empty() {
            return Err(DataFetchError::configuration("版本信息不能为空"));
        }

        Ok(())
    }
}
