// 插件注册表
// 按插件 ID 保存已验证的连接器及其会话表

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use data_fetch_abi::CONNECTOR_API_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::errors::{DataFetchError, DataFetchResult};
use crate::plugins::lifecycle::SessionTable;
use crate::plugins::plugin_interface::{
    ConfigFieldSpec, Connector, ConnectorDescriptor, PluginSource,
};

/// 注册表配置
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// 宿主支持的 ABI 版本，不相等即拒绝
    pub api_version: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_version: CONNECTOR_API_VERSION,
        }
    }
}

/// 卸载策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnloadPolicy {
    /// 仍有活动会话时拒绝卸载
    #[default]
    Refuse,
    /// 先销毁剩余会话再卸载
    ForceDestroy,
}

/// 已注册的连接器
pub struct RegisteredConnector {
    descriptor: ConnectorDescriptor,
    config_fields: Vec<ConfigFieldSpec>,
    registered_at: DateTime<Utc>,
    sessions: SessionTable,
}

/// 连接器摘要
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectorSummary {
    #[serde(flatten)]
    pub descriptor: ConnectorDescriptor,
    /// 插件来源
    pub source: PluginSource,
    /// 配置项数量
    pub field_count: usize,
    /// 活动会话数
    pub live_sessions: usize,
    /// 注册时间
    pub registered_at: DateTime<Utc>,
}

impl RegisteredConnector {
    pub fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    pub fn config_fields(&self) -> &[ConfigFieldSpec] {
        &self.config_fields
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn source(&self) -> &PluginSource {
        self.sessions.connector().source()
    }

    /// 摘要信息
    pub fn summary(&self) -> ConnectorSummary {
        ConnectorSummary {
            descriptor: self.descriptor.clone(),
            source: self.source().clone(),
            field_count: self.config_fields.len(),
            live_sessions: self.sessions.live_count(),
            registered_at: self.registered_at,
        }
    }

    /// 检查会话配置：必须是对象，键必须是已声明的配置项，值必须是字符串
    ///
    /// 字段内容由插件自行校验。
    pub fn validate_config(&self, config: &Value) -> DataFetchResult<Map<String, Value>> {
        let plugin_id = &self.descriptor.id;
        let object = config
            .as_object()
            .ok_or_else(|| DataFetchError::invalid_config(plugin_id, "配置必须是 JSON 对象"))?;

        for (key, value) in object {
            if !self.config_fields.iter().any(|field| &field.key == key) {
                return Err(DataFetchError::invalid_config(
                    plugin_id,
                    format!("未声明的配置项: {}", key),
                ));
            }
            if !value.is_string() {
                return Err(DataFetchError::invalid_config(
                    plugin_id,
                    format!("配置项 {} 必须是字符串", key),
                ));
            }
        }

        Ok(object.clone())
    }
}

/// 连接器注册表
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<RegisteredConnector>>>,
    config: RegistryConfig,
}

impl ConnectorRegistry {
    /// 创建新的注册表
    pub fn new(config: Option<RegistryConfig>) -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
            config: config.unwrap_or_default(),
        }
    }

    /// 支持的 ABI 版本
    pub fn api_version(&self) -> u32 {
        self.config.api_version
    }

    /// 验证并注册连接器
    ///
    /// 插件调用在注册表锁之外完成，只有插入操作互斥。任何失败都不会改变注册表。
    pub fn register(&self, connector: Arc<dyn Connector>) -> DataFetchResult<ConnectorDescriptor> {
        let source = connector.source().display_name().to_string();

        let descriptor = connector
            .describe()
            .map_err(|e| DataFetchError::malformed_plugin(&source, e.to_string()))?;
        if descriptor.id.is_empty() {
            return Err(DataFetchError::malformed_plugin(&source, "插件 ID 为空"));
        }
        if descriptor.api_version != self.config.api_version {
            return Err(DataFetchError::incompatible_version(
                &descriptor.id,
                self.config.api_version,
                descriptor.api_version,
            ));
        }

        let config_fields = connector
            .config_fields()
            .map_err(|e| DataFetchError::malformed_plugin(&source, e.to_string()))?;
        {
            let mut keys = HashSet::new();
            if let Some(field) = config_fields.iter().find(|field| !keys.insert(&field.key)) {
                return Err(DataFetchError::malformed_plugin(
                    &source,
                    format!("配置项重复: {}", field.key),
                ));
            }
        }

        let mut connectors = self.write();
        if connectors.contains_key(&descriptor.id) {
            return Err(DataFetchError::duplicate_identifier(&descriptor.id));
        }

        let entry = RegisteredConnector {
            descriptor: descriptor.clone(),
            config_fields,
            registered_at: Utc::now(),
            sessions: SessionTable::new(&descriptor.id, connector),
        };
        connectors.insert(descriptor.id.clone(), Arc::new(entry));

        info!(plugin_id = %descriptor.id, source = %source, "连接器已注册");
        Ok(descriptor)
    }

    /// 获取连接器
    pub fn get(&self, plugin_id: &str) -> DataFetchResult<Arc<RegisteredConnector>> {
        self.read()
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| DataFetchError::not_found(format!("连接器 {}", plugin_id)))
    }

    /// 是否已注册
    pub fn contains(&self, plugin_id: &str) -> bool {
        self.read().contains_key(plugin_id)
    }

    /// 所有连接器，按 ID 排序
    pub fn list(&self) -> Vec<Arc<RegisteredConnector>> {
        let mut connectors: Vec<Arc<RegisteredConnector>> = self.read().values().cloned().collect();
        connectors.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        connectors
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 移除连接器，返回被销毁的会话数
    ///
    /// 会话在注册表锁释放后销毁；动态库在最后一个引用释放时卸载。
    pub fn remove(&self, plugin_id: &str, policy: UnloadPolicy) -> DataFetchResult<usize> {
        let entry = {
            let mut connectors = self.write();
            let entry = connectors
                .get(plugin_id)
                .ok_or_else(|| DataFetchError::not_found(format!("连接器 {}", plugin_id)))?;

            if let Err(e) = entry.sessions.retire(policy) {
                warn!(plugin_id = %plugin_id, error = %e, "拒绝卸载连接器");
                return Err(e);
            }
            connectors.remove(plugin_id)
        };

        let destroyed = entry.map(|entry| entry.sessions.destroy_all()).unwrap_or(0);
        info!(plugin_id = %plugin_id, destroyed, "连接器已卸载");
        Ok(destroyed)
    }

    /// 移除所有连接器，先销毁会话，返回被销毁的会话数
    pub fn clear(&self) -> usize {
        let drained: Vec<Arc<RegisteredConnector>> = {
            let mut connectors = self.write();
            connectors.drain().map(|(_, entry)| entry).collect()
        };

        let mut destroyed = 0;
        for entry in drained {
            // 强制策略不会失败
            let _ = entry.sessions.retire(UnloadPolicy::ForceDestroy);
            destroyed += entry.sessions.destroy_all();
            debug!(plugin_id = %entry.descriptor.id, "连接器已释放");
        }
        destroyed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<RegisteredConnector>>> {
        self.connectors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<RegisteredConnector>>> {
        self.connectors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}
