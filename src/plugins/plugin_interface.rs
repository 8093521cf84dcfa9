// 连接器能力接口
// 宿主逻辑只通过 Connector trait 与插件交互，ABI 细节由加载器适配

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// 连接器能力集合
///
/// 实现者负责把插件的哨兵返回值（空指针、false）转换为 `Result`。
/// 宿主不假设插件线程安全，同一插件的调用由实现者串行化。
pub trait Connector: Send + Sync {
    /// 读取插件信息
    fn describe(&self) -> Result<ConnectorDescriptor, BoundaryError>;

    /// 读取并复制配置项列表，保持插件声明的顺序
    fn config_fields(&self) -> Result<Vec<ConfigFieldSpec>, BoundaryError>;

    /// 创建会话，插件拒绝配置时返回错误
    fn create_session(&self, config_json: &str) -> Result<RawSession, BoundaryError>;

    /// 销毁会话，消费原始指针
    fn destroy_session(&self, session: RawSession);

    /// 测试连接
    fn test_connect(&self, session: &RawSession) -> bool;

    /// 提取数据，返回宿主持有的副本
    fn fetch_data(&self, session: &RawSession) -> Result<String, BoundaryError>;

    /// 插件来源
    fn source(&self) -> &PluginSource;
}

/// 连接器描述信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectorDescriptor {
    /// 插件唯一 ID
    pub id: String,
    /// 显示名称
    pub name: String,
    /// 插件描述
    pub description: String,
    /// 声明的 ABI 版本
    pub api_version: u32,
}

/// 配置项定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConfigFieldSpec {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub default_value: String,
    /// select 类型的选项，原样保留插件给出的 JSON 字符串
    pub options: Option<String>,
}

/// 输入框类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Select,
    Password,
    Other(String),
}

impl ConfigFieldSpec {
    /// 输入框类型
    pub fn kind(&self) -> FieldKind {
        match self.field_type.as_str() {
            "text" => FieldKind::Text,
            "select" => FieldKind::Select,
            "password" => FieldKind::Password,
            other => FieldKind::Other(other.to_string()),
        }
    }

    /// 用于展示的默认值，密码类型不回显明文
    pub fn display_default(&self) -> Option<&str> {
        if self.default_value.is_empty() {
            return None;
        }
        match self.kind() {
            FieldKind::Password => Some("******"),
            _ => Some(&self.default_value),
        }
    }

    /// 解析 select 选项，没有选项或格式错误时返回 `None`
    pub fn parsed_options(&self) -> Option<serde_json::Value> {
        self.options
            .as_deref()
            .filter(|options| !options.is_empty())
            .and_then(|options| serde_json::from_str(options).ok())
    }
}

/// 插件返回的不透明会话指针
///
/// 只由创建它的连接器使用，且同一时刻只有一个调用者持有。
#[derive(Debug)]
pub struct RawSession(NonNull<c_void>);

// 会话指针只在持有会话锁时被使用
unsafe impl Send for RawSession {}

impl RawSession {
    /// 包装插件返回的指针，空指针返回 `None`
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// ABI 边界上的失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    /// 入口函数返回了哨兵值
    #[error("{entry} 返回了空值")]
    NullReturn { entry: &'static str },

    /// 必填字段为空指针
    #[error("字段 {field} 为空")]
    NullField { field: &'static str },

    /// 配置项数量无效
    #[error("配置项数量无效: {count}")]
    InvalidCount { count: i32 },

    /// 传给插件的字符串包含 NUL 字节
    #[error("字符串包含 NUL 字节")]
    InteriorNul,
}

/// 插件来源
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginSource {
    /// 动态库文件
    Library {
        path: String,
        size_bytes: u64,
        checksum: Option<String>,
    },
    /// 宿主进程内静态链接的函数表
    Builtin { name: String },
}

impl PluginSource {
    /// 用于日志和错误信息的名称
    pub fn display_name(&self) -> &str {
        match self {
            Self::Library { path, .. } => path,
            Self::Builtin { name } => name,
        }
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library { path, .. } => write!(f, "library:{}", path),
            Self::Builtin { name } => write!(f, "builtin:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(field_type: &str, options: Option<&str>) -> ConfigFieldSpec {
        ConfigFieldSpec {
            key: "format".to_string(),
            label: "格式".to_string(),
            field_type: field_type.to_string(),
            default_value: String::new(),
            options: options.map(str::to_string),
        }
    }

    #[test]
    fn test_field_kind() {
        assert_eq!(field("text", None).kind(), FieldKind::Text);
        assert_eq!(field("select", None).kind(), FieldKind::Select);
        assert_eq!(field("password", None).kind(), FieldKind::Password);
        assert_eq!(field("number", None).kind(), FieldKind::Other("number".to_string()));
    }

    #[test]
    fn test_display_default_masks_password() {
        let mut token = field("password", None);
        assert_eq!(token.display_default(), None);

        token.default_value = "s3cret".to_string();
        assert_eq!(token.display_default(), Some("******"));

        let mut format = field("select", None);
        format.default_value = "json".to_string();
        assert_eq!(format.display_default(), Some("json"));
    }

    #[test]
    fn test_parsed_options() {
        let select = field("select", Some(r#"[{"label":"CSV","value":"csv"}]"#));
        assert_eq!(select.parsed_options().unwrap()[0]["value"], "csv");

        assert!(field("select", Some("")).parsed_options().is_none());
        assert!(field("select", Some("not json")).parsed_options().is_none());
        assert!(field("text", None).parsed_options().is_none());
    }

    #[test]
    fn test_field_serialization_uses_type_key() {
        let value = serde_json::to_value(field("text", None)).unwrap();
        assert_eq!(value["type"], "text");
        assert!(value.get("field_type").is_none());
    }

    #[test]
    fn test_raw_session_rejects_null() {
        assert!(RawSession::new(std::ptr::null_mut()).is_none());
    }

    #[test]
    fn test_plugin_source_display() {
        let source = PluginSource::Builtin {
            name: "memory".to_string(),
        };
        assert_eq!(source.to_string(), "builtin:memory");
        assert_eq!(source.display_name(), "memory");
    }
}
