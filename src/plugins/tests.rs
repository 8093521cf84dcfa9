// 插件宿主测试
// 用进程内的 C ABI 函数表模拟插件，完整经过适配层

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use data_fetch_abi::{
    ConfigField, Connector as GuestConnector, ConnectorInfo, ConnectorPlugin, SessionConfig,
};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::PluginsConfig;
use crate::errors::DataFetchError;
use crate::plugins::{PluginHost, SessionHandle, SessionState, UnloadPolicy};

/// 内存连接器：返回配置中的行和提取次数
struct Memory {
    rows: String,
    mode: String,
    fetches: u32,
}

static MEMORY_INFO: ConnectorInfo = ConnectorInfo::new(c"memory", c"内存", c"返回配置中的行");
static MEMORY_FIELDS: [ConfigField; 3] = [
    ConfigField::new(c"rows", c"数据", c"text").with_default(c"[]"),
    ConfigField::new(c"mode", c"模式", c"select")
        .with_default(c"online")
        .with_options(c"[{\"label\":\"在线\",\"value\":\"online\"},{\"label\":\"离线\",\"value\":\"offline\"}]"),
    ConfigField::new(c"token", c"令牌", c"password"),
];

impl GuestConnector for Memory {
    fn info() -> &'static ConnectorInfo {
        &MEMORY_INFO
    }

    fn config_fields() -> &'static [ConfigField] {
        &MEMORY_FIELDS
    }

    fn connect(config: SessionConfig) -> Option<Self> {
        let mode = config.get("mode").cloned().unwrap_or_else(|| "online".to_string());
        if mode == "reject" {
            return None;
        }
        Some(Self {
            rows: config.get("rows").cloned().unwrap_or_else(|| "[]".to_string()),
            mode,
            fetches: 0,
        })
    }

    fn test_connect(&mut self) -> bool {
        self.mode != "offline"
    }

    fn fetch_data(&mut self) -> Option<String> {
        if self.rows == "fail" {
            return None;
        }
        self.fetches += 1;
        Some(format!("{{\"rows\":{},\"fetch\":{}}}", self.rows, self.fetches))
    }
}

static MEMORY_TABLE: ConnectorPlugin = ConnectorPlugin::of::<Memory>();

macro_rules! static_connector {
    ($ty:ident, $table:ident, $info:expr) => {
        struct $ty;

        impl GuestConnector for $ty {
            fn info() -> &'static ConnectorInfo {
                static INFO: ConnectorInfo = $info;
                &INFO
            }

            fn config_fields() -> &'static [ConfigField] {
                &[]
            }

            fn connect(_config: SessionConfig) -> Option<Self> {
                Some($ty)
            }

            fn test_connect(&mut self) -> bool {
                true
            }

            fn fetch_data(&mut self) -> Option<String> {
                Some("[]".to_string())
            }
        }

        static $table: ConnectorPlugin = ConnectorPlugin::of::<$ty>();
    };
}

static_connector!(
    PostgresA,
    POSTGRES_A_TABLE,
    ConnectorInfo::new(c"postgres", c"PostgreSQL A", c"第一个")
);
static_connector!(
    PostgresB,
    POSTGRES_B_TABLE,
    ConnectorInfo::new(c"postgres", c"PostgreSQL B", c"第二个")
);
static_connector!(
    Future,
    FUTURE_TABLE,
    ConnectorInfo::new(c"future", c"Future", c"新版本 ABI").with_api_version(2)
);

/// 统计会话释放次数的连接器
macro_rules! counting_connector {
    ($ty:ident, $table:ident, $drops:ident, $id:expr) => {
        static $drops: AtomicUsize = AtomicUsize::new(0);

        struct $ty;

        impl Drop for $ty {
            fn drop(&mut self) {
                $drops.fetch_add(1, Ordering::SeqCst);
            }
        }

        impl GuestConnector for $ty {
            fn info() -> &'static ConnectorInfo {
                static INFO: ConnectorInfo = ConnectorInfo::new($id, c"计数", c"统计销毁次数");
                &INFO
            }

            fn config_fields() -> &'static [ConfigField] {
                &[]
            }

            fn connect(_config: SessionConfig) -> Option<Self> {
                Some($ty)
            }

            fn test_connect(&mut self) -> bool {
                true
            }

            fn fetch_data(&mut self) -> Option<String> {
                Some("{}".to_string())
            }
        }

        static $table: ConnectorPlugin = ConnectorPlugin::of::<$ty>();
    };
}

counting_connector!(Tracked, TRACKED_TABLE, TRACKED_DROPS, c"tracked");
counting_connector!(Lingering, LINGERING_TABLE, LINGERING_DROPS, c"lingering");
counting_connector!(Unloaded, UNLOADED_TABLE, UNLOADED_DROPS, c"unloaded");

fn memory_host() -> PluginHost {
    let host = PluginHost::default();
    host.register_builtin("memory", &MEMORY_TABLE).unwrap();
    host
}

fn rows(rows: &str) -> Value {
    json!({ "rows": rows })
}

fn reparse(handle: &SessionHandle) -> SessionHandle {
    handle.to_string().parse().unwrap()
}

#[test]
fn test_create_then_destroy_leaves_other_plugins_untouched() {
    let host = memory_host();
    host.register_builtin("postgres", &POSTGRES_A_TABLE).unwrap();

    let other = host.create_session("postgres", &json!({})).unwrap();
    let session = host.create_session("memory", &rows("[1]")).unwrap();
    host.destroy_session(session).unwrap();

    assert_eq!(host.registry().len(), 2);
    let ids: Vec<String> = host.list_connectors().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["memory", "postgres"]);
    assert_eq!(host.fetch_data(&other).unwrap(), "[]");
    assert_eq!(host.live_sessions(), 1);
}

#[test]
fn test_connect_is_idempotent_for_fetch() {
    let host = memory_host();

    let sampled = host.create_session("memory", &rows("[1,2]")).unwrap();
    let untouched = host.create_session("memory", &rows("[1,2]")).unwrap();

    for _ in 0..3 {
        assert!(host.test_connect(&sampled).unwrap());
    }

    for _ in 0..2 {
        assert_eq!(
            host.fetch_data(&sampled).unwrap(),
            host.fetch_data(&untouched).unwrap()
        );
    }

    let info = host.session_info(&sampled).unwrap();
    assert_eq!(info.state, SessionState::Created);
    assert_eq!(info.last_test, Some(true));
    assert_eq!(info.fetch_count, 2);
}

#[test]
fn test_double_destroy_is_rejected_before_plugin_code() {
    let host = PluginHost::default();
    host.register_builtin("tracked", &TRACKED_TABLE).unwrap();

    let handle = host.create_session("tracked", &json!({})).unwrap();
    let stale = reparse(&handle);

    host.destroy_session(handle).unwrap();
    assert_eq!(TRACKED_DROPS.load(Ordering::SeqCst), 1);

    let error = host.destroy_session(reparse(&stale)).unwrap_err();
    assert!(matches!(error, DataFetchError::UseAfterDestroy { .. }));
    assert!(error.is_programming_error());
    assert_eq!(TRACKED_DROPS.load(Ordering::SeqCst), 1);

    assert!(matches!(
        host.test_connect(&stale),
        Err(DataFetchError::UseAfterDestroy { .. })
    ));
    assert!(matches!(
        host.fetch_data(&stale),
        Err(DataFetchError::UseAfterDestroy { .. })
    ));
}

#[test]
fn test_incompatible_version_never_reaches_registry() {
    let host = memory_host();

    let error = host.register_builtin("future", &FUTURE_TABLE).unwrap_err();
    match error {
        DataFetchError::IncompatibleVersion {
            plugin_id,
            expected,
            found,
        } => {
            assert_eq!(plugin_id, "future");
            assert_eq!(expected, 1);
            assert_eq!(found, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(host.registry().len(), 1);
    assert!(!host.registry().contains("future"));
}

#[test]
fn test_duplicate_identifier_keeps_first() {
    let host = PluginHost::default();
    host.register_builtin("postgres-a", &POSTGRES_A_TABLE).unwrap();

    let error = host.register_builtin("postgres-b", &POSTGRES_B_TABLE).unwrap_err();
    assert!(matches!(error, DataFetchError::DuplicateIdentifier { ref plugin_id } if plugin_id == "postgres"));

    assert_eq!(host.registry().len(), 1);
    assert_eq!(host.connector("postgres").unwrap().descriptor.name, "PostgreSQL A");
}

#[test]
fn test_config_fields_are_copied_in_order() {
    let host = memory_host();

    let fields = host.config_fields("memory").unwrap();
    assert_eq!(fields.len(), 3);

    let keys: Vec<&str> = fields.iter().map(|field| field.key.as_str()).collect();
    assert_eq!(keys, vec!["rows", "mode", "token"]);
    assert_eq!(fields[0].default_value, "[]");
    assert_eq!(fields[1].parsed_options().unwrap()[1]["value"], "offline");
    assert_eq!(fields[2].field_type, "password");
    assert!(fields[2].options.is_none());

    assert!(matches!(
        host.config_fields("mysql"),
        Err(DataFetchError::NotFound { .. })
    ));
}

#[test]
fn test_unload_with_live_session_is_refused() {
    let host = PluginHost::default();
    host.register_builtin("unloaded", &UNLOADED_TABLE).unwrap();
    let handle = host.create_session("unloaded", &json!({})).unwrap();

    let error = host.unload_plugin("unloaded", UnloadPolicy::Refuse).unwrap_err();
    assert!(matches!(error, DataFetchError::PluginBusy { live_sessions: 1, .. }));
    assert!(host.registry().contains("unloaded"));
    assert_eq!(host.fetch_data(&handle).unwrap(), "{}");

    let destroyed = host.unload_plugin("unloaded", UnloadPolicy::ForceDestroy).unwrap();
    assert_eq!(destroyed, 1);
    assert_eq!(UNLOADED_DROPS.load(Ordering::SeqCst), 1);
    assert!(!host.registry().contains("unloaded"));
    assert!(host.list_sessions().is_empty());

    assert!(matches!(
        host.fetch_data(&handle),
        Err(DataFetchError::UseAfterDestroy { .. })
    ));
    assert!(matches!(
        host.destroy_session(handle),
        Err(DataFetchError::UseAfterDestroy { .. })
    ));
    assert_eq!(UNLOADED_DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unload_without_sessions() {
    let host = memory_host();
    let handle = host.create_session("memory", &rows("[]")).unwrap();
    host.destroy_session(handle).unwrap();

    assert_eq!(host.unload_plugin("memory", UnloadPolicy::Refuse).unwrap(), 0);
    assert!(host.registry().is_empty());
    assert!(matches!(
        host.unload_plugin("memory", UnloadPolicy::Refuse),
        Err(DataFetchError::NotFound { .. })
    ));
}

#[test]
fn test_stale_handle_does_not_reach_reloaded_plugin() {
    let host = memory_host();
    let handle = host.create_session("memory", &rows("[1]")).unwrap();
    let stale = reparse(&handle);
    host.unload_plugin("memory", UnloadPolicy::ForceDestroy).unwrap();

    host.register_builtin("memory", &MEMORY_TABLE).unwrap();
    let fresh = host.create_session("memory", &rows("[2]")).unwrap();
    assert_ne!(fresh.to_string(), stale.to_string());

    assert!(matches!(
        host.fetch_data(&stale),
        Err(DataFetchError::UseAfterDestroy { .. })
    ));
    assert_eq!(host.fetch_data(&fresh).unwrap(), "{\"rows\":[2],\"fetch\":1}");
}

#[test]
fn test_invalid_config_is_recoverable() {
    let host = memory_host();

    for config in [
        json!("rows"),
        json!({ "rows": 42 }),
        json!({ "unknown": "x" }),
        json!({ "mode": "reject" }),
    ] {
        let error = host.create_session("memory", &config).unwrap_err();
        assert!(matches!(error, DataFetchError::InvalidConfig { .. }), "{config}");
        assert!(error.is_session_error());
    }
    assert_eq!(host.live_sessions(), 0);

    let handle = host.create_session("memory", &rows("[1]")).unwrap();
    assert_eq!(host.live_sessions(), 1);
    host.destroy_session(handle).unwrap();
}

#[test]
fn test_fetch_failure_is_recoverable() {
    let host = memory_host();
    let handle = host.create_session("memory", &rows("fail")).unwrap();

    for _ in 0..2 {
        let error = host.fetch_data(&handle).unwrap_err();
        assert!(matches!(error, DataFetchError::FetchFailed { .. }));
    }

    let info = host.session_info(&handle).unwrap();
    assert_eq!(info.state, SessionState::Created);
    assert_eq!(info.fetch_count, 0);
    host.destroy_session(handle).unwrap();
}

#[test]
fn test_ensure_connected_reports_test_failed() {
    let host = memory_host();

    let offline = host
        .create_session("memory", &json!({ "mode": "offline" }))
        .unwrap();
    let error = host.ensure_connected(&offline).unwrap_err();
    assert!(matches!(error, DataFetchError::TestFailed { .. }));
    assert_eq!(host.session_info(&offline).unwrap().last_test, Some(false));

    let online = host.create_session("memory", &json!({ "mode": "online" })).unwrap();
    assert!(host.ensure_connected(&online).is_ok());
}

#[test]
fn test_dropping_host_destroys_sessions() {
    {
        let host = PluginHost::default();
        host.register_builtin("lingering", &LINGERING_TABLE).unwrap();
        host.create_session("lingering", &json!({})).unwrap();
        host.create_session("lingering", &json!({})).unwrap();
        assert_eq!(LINGERING_DROPS.load(Ordering::SeqCst), 0);
    }
    assert_eq!(LINGERING_DROPS.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shutdown_clears_registry() {
    let host = memory_host();
    host.create_session("memory", &rows("[]")).unwrap();

    assert_eq!(host.shutdown(), 1);
    assert!(host.registry().is_empty());
    assert_eq!(host.live_sessions(), 0);
}

#[test]
fn test_session_handle_text_form() {
    let handle: SessionHandle = "com.example.excel:3:17".parse().unwrap();
    assert_eq!(handle.plugin_id(), "com.example.excel");
    assert_eq!(handle.to_string(), "com.example.excel:3:17");

    let handle: SessionHandle = "urn:pg:0:1".parse().unwrap();
    assert_eq!(handle.plugin_id(), "urn:pg");

    for invalid in ["abc", "pg:x:1", ":0:1", "pg:0:-1", ""] {
        let error = invalid.parse::<SessionHandle>().unwrap_err();
        assert_eq!(error.error_code(), "INVALID_HANDLE");
    }
}

#[test]
fn test_unknown_plugin_handle() {
    let host = memory_host();
    let handle: SessionHandle = "mysql:0:1".parse().unwrap();
    assert!(matches!(
        host.test_connect(&handle),
        Err(DataFetchError::UseAfterDestroy { .. })
    ));
    assert!(matches!(
        host.create_session("mysql", &json!({})),
        Err(DataFetchError::NotFound { .. })
    ));
}

#[test]
fn test_create_session_from_map() {
    let host = memory_host();
    let config: HashMap<String, String> =
        [("rows".to_string(), "[\"a\"]".to_string())].into_iter().collect();

    let handle = host.create_session_from_map("memory", &config).unwrap();
    assert!(host.test_connect(&handle).unwrap());
    assert_eq!(
        host.fetch_data(&handle).unwrap(),
        "{\"rows\":[\"a\"],\"fetch\":1}"
    );
    host.destroy_session(handle).unwrap();
}

#[test]
fn test_list_sessions() {
    let host = memory_host();
    host.register_builtin("postgres", &POSTGRES_A_TABLE).unwrap();

    let first = host.create_session("memory", &rows("[]")).unwrap();
    let _second = host.create_session("postgres", &json!({})).unwrap();
    let third = host.create_session("memory", &rows("[]")).unwrap();
    host.destroy_session(first).unwrap();

    let sessions = host.list_sessions();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().any(|info| info.handle == third.to_string()));
    assert!(sessions.iter().all(|info| info.state == SessionState::Created));

    let summary = host.connector("memory").unwrap();
    assert_eq!(summary.live_sessions, 1);
    assert_eq!(summary.field_count, 3);
}

#[test]
fn test_missing_export_is_rejected() {
    let host = PluginHost::default();
    let table = ConnectorPlugin {
        destroy_session: None,
        ..MEMORY_TABLE
    };

    let error = host.register_builtin("partial", &table).unwrap_err();
    match error {
        DataFetchError::MissingExport { source_path, symbol } => {
            assert_eq!(source_path, "partial");
            assert_eq!(symbol, "DestroySession");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(host.registry().is_empty());
}

#[test]
fn test_concurrent_sessions() {
    let host = memory_host();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let host = &host;
            scope.spawn(move || {
                for round in 0..20 {
                    let data = format!("[{worker},{round}]");
                    let handle = host.create_session("memory", &rows(&data)).unwrap();
                    assert!(host.test_connect(&handle).unwrap());
                    let payload = host.fetch_data(&handle).unwrap();
                    assert_eq!(payload, format!("{{\"rows\":{data},\"fetch\":1}}"));
                    host.destroy_session(handle).unwrap();
                }
            });
        }
    });

    assert_eq!(host.live_sessions(), 0);
}

#[test]
fn test_load_all_skips_broken_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("broken.so"), b"not a library").unwrap();
    fs::write(temp_dir.path().join("notes.txt"), b"ignored").unwrap();

    let config = PluginsConfig {
        directory: temp_dir.path().display().to_string(),
        ..PluginsConfig::default()
    };
    let host = PluginHost::new(&config);
    host.register_builtin("memory", &MEMORY_TABLE).unwrap();

    let report = host.load_all().unwrap();
    assert!(report.loaded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error_code, "LIBRARY_LOAD_ERROR");
    assert!(report.failed[0].path.ends_with("broken.so"));
    assert!(report.scanned_at.is_some());
    assert_eq!(host.registry().len(), 1);
}
