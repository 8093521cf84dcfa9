// 插件宿主
// 组合加载器和注册表，对外提供插件加载与会话操作

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use data_fetch_abi::ConnectorPlugin;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::config::PluginsConfig;
use crate::errors::{DataFetchError, DataFetchResult};
use crate::plugins::lifecycle::{SessionHandle, SessionInfo};
use crate::plugins::plugin_interface::{ConfigFieldSpec, Connector, ConnectorDescriptor};
use crate::plugins::plugin_loader::{NativeConnector, PluginLoader, PluginLoaderFactory};
use crate::plugins::plugin_registry::{
    ConnectorRegistry, ConnectorSummary, RegistryConfig, UnloadPolicy,
};

/// 目录扫描结果
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct LoadReport {
    /// 成功加载的连接器
    pub loaded: Vec<ConnectorDescriptor>,
    /// 加载失败的文件
    pub failed: Vec<LoadFailure>,
    /// 扫描完成时间
    pub scanned_at: Option<DateTime<Utc>>,
}

/// 单个文件的加载失败
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoadFailure {
    pub path: String,
    pub error_code: String,
    pub message: String,
}

/// 插件宿主
///
/// 构造顺序：加载器 -> 注册表 -> 加载插件；释放顺序：销毁会话 -> 卸载插件。
pub struct PluginHost {
    loader: PluginLoader,
    registry: ConnectorRegistry,
}

impl PluginHost {
    /// 根据插件配置创建宿主，不自动加载插件
    pub fn new(config: &PluginsConfig) -> Self {
        Self {
            loader: PluginLoaderFactory::create(config),
            registry: ConnectorRegistry::new(Some(RegistryConfig {
                api_version: config.api_version,
            })),
        }
    }

    /// 使用自定义组件创建宿主
    pub fn with_parts(loader: PluginLoader, registry: ConnectorRegistry) -> Self {
        Self { loader, registry }
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// 加载单个动态库
    pub fn load_plugin(&self, source: &str) -> DataFetchResult<ConnectorDescriptor> {
        info!(source = %source, "加载插件");

        let connector = self.loader.load_library(source)?;
        self.register_connector(Arc::new(connector))
    }

    /// 扫描插件目录并加载所有插件，单个失败只记录不终止
    pub fn load_all(&self) -> DataFetchResult<LoadReport> {
        let mut report = LoadReport::default();

        for path in self.loader.scan_plugins()? {
            let path_text = path.display().to_string();
            match self.load_plugin(&path_text) {
                Ok(descriptor) => report.loaded.push(descriptor),
                Err(e) => {
                    warn!(path = %path_text, error = %e, "插件加载失败，已跳过");
                    report.failed.push(LoadFailure {
                        path: path_text,
                        error_code: e.error_code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        report.scanned_at = Some(Utc::now());

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "插件目录扫描完成"
        );
        Ok(report)
    }

    /// 注册宿主进程内的函数表
    pub fn register_builtin(
        &self,
        name: &str,
        table: &ConnectorPlugin,
    ) -> DataFetchResult<ConnectorDescriptor> {
        let connector = NativeConnector::from_table(name, table)?;
        self.register_connector(Arc::new(connector))
    }

    /// 注册任意连接器实现
    pub fn register_connector(
        &self,
        connector: Arc<dyn Connector>,
    ) -> DataFetchResult<ConnectorDescriptor> {
        let source = connector.source().to_string();
        self.registry.register(connector).inspect_err(|e| {
            warn!(source = %source, error_code = e.error_code(), error = %e, "插件注册失败");
        })
    }

    /// 卸载插件，返回被销毁的会话数
    pub fn unload_plugin(&self, plugin_id: &str, policy: UnloadPolicy) -> DataFetchResult<usize> {
        self.registry.remove(plugin_id, policy)
    }

    /// 所有连接器描述，按 ID 排序
    pub fn list_connectors(&self) -> Vec<ConnectorDescriptor> {
        self.registry
            .list()
            .iter()
            .map(|entry| entry.descriptor().clone())
            .collect()
    }

    /// 所有连接器摘要，按 ID 排序
    pub fn connector_summaries(&self) -> Vec<ConnectorSummary> {
        self.registry
            .list()
            .iter()
            .map(|entry| entry.summary())
            .collect()
    }

    /// 单个连接器摘要
    pub fn connector(&self, plugin_id: &str) -> DataFetchResult<ConnectorSummary> {
        Ok(self.registry.get(plugin_id)?.summary())
    }

    /// 连接器的配置项，保持声明顺序
    pub fn config_fields(&self, plugin_id: &str) -> DataFetchResult<Vec<ConfigFieldSpec>> {
        Ok(self.registry.get(plugin_id)?.config_fields().to_vec())
    }

    /// 以 JSON 对象创建会话
    pub fn create_session(&self, plugin_id: &str, config: &Value) -> DataFetchResult<SessionHandle> {
        let entry = self.registry.get(plugin_id)?;
        let object = entry.validate_config(config)?;
        let config_json = serde_json::to_string(&object)?;

        entry.sessions().create(&config_json)
    }

    /// 以字符串键值对创建会话
    pub fn create_session_from_map(
        &self,
        plugin_id: &str,
        config: &HashMap<String, String>,
    ) -> DataFetchResult<SessionHandle> {
        let value = serde_json::to_value(config)?;
        self.create_session(plugin_id, &value)
    }

    /// 测试连接
    pub fn test_connect(&self, handle: &SessionHandle) -> DataFetchResult<bool> {
        self.session_table(handle)?.sessions().test_connect(handle)
    }

    /// 测试连接，失败时返回 `TestFailed`
    pub fn ensure_connected(&self, handle: &SessionHandle) -> DataFetchResult<()> {
        if self.test_connect(handle)? {
            Ok(())
        } else {
            Err(DataFetchError::test_failed(handle.plugin_id(), handle.to_string()))
        }
    }

    /// 提取数据
    pub fn fetch_data(&self, handle: &SessionHandle) -> DataFetchResult<String> {
        self.session_table(handle)?.sessions().fetch(handle)
    }

    /// 销毁会话，消费句柄
    pub fn destroy_session(&self, handle: SessionHandle) -> DataFetchResult<()> {
        self.session_table(&handle)?.sessions().destroy(handle)
    }

    /// 会话信息
    pub fn session_info(&self, handle: &SessionHandle) -> DataFetchResult<SessionInfo> {
        self.session_table(handle)?.sessions().info(handle)
    }

    /// 所有活动会话
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.registry
            .list()
            .iter()
            .flat_map(|entry| entry.sessions().list())
            .collect()
    }

    /// 活动会话总数
    pub fn live_sessions(&self) -> usize {
        self.registry
            .list()
            .iter()
            .map(|entry| entry.sessions().live_count())
            .sum()
    }

    /// 销毁所有会话并卸载所有插件，返回被销毁的会话数
    pub fn shutdown(&self) -> usize {
        let destroyed = self.registry.clear();
        info!(destroyed, "插件宿主已关闭");
        destroyed
    }

    // 句柄所属插件已卸载时，会话必然已被销毁
    fn session_table(
        &self,
        handle: &SessionHandle,
    ) -> DataFetchResult<Arc<crate::plugins::RegisteredConnector>> {
        self.registry.get(handle.plugin_id()).map_err(|_| {
            error!(handle = %handle, "会话所属连接器未注册");
            DataFetchError::use_after_destroy(handle.to_string())
        })
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new(&PluginsConfig::default())
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.registry.clear();
    }
}
