// 插件加载器
// 扫描插件目录，通过 libloading 加载动态库并解析入口函数

use std::ffi::{c_int, CStr, CString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use data_fetch_abi::{
    copy_c_string, ConfigField, ConnectorPlugin, CreateSessionFn, DestroySessionFn, FetchDataFn,
    GetConfigFieldsFn, GetConnectorInfoFn, TestConnectFn, CREATE_SESSION_SYMBOL,
    DESTROY_SESSION_SYMBOL, FETCH_DATA_SYMBOL, GET_CONFIG_FIELDS_SYMBOL,
    GET_CONNECTOR_INFO_SYMBOL, PLUGIN_TABLE_SYMBOL, TEST_CONNECTION_SYMBOL, TEST_CONNECT_SYMBOL,
};
use libloading::Library;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::PluginsConfig;
use crate::errors::{DataFetchError, DataFetchResult};
use crate::plugins::lock;
use crate::plugins::plugin_interface::{
    BoundaryError, ConfigFieldSpec, Connector, ConnectorDescriptor, PluginSource, RawSession,
};

/// 加载器配置
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// 支持的动态库扩展名（小写，不含点）
    pub extensions: Vec<String>,
    /// 最大插件大小（MB）
    pub max_plugin_size_mb: u64,
    /// 是否计算校验和
    pub compute_checksum: bool,
    /// 是否允许加载插件目录之外的文件
    pub allow_external_paths: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from(&PluginsConfig::default())
    }
}

impl From<&PluginsConfig> for LoaderConfig {
    fn from(config: &PluginsConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            max_plugin_size_mb: config.max_plugin_size_mb,
            compute_checksum: config.compute_checksum,
            allow_external_paths: config.allow_external_paths,
        }
    }
}

/// 插件加载器
pub struct PluginLoader {
    /// 插件目录
    plugins_directory: PathBuf,
    /// 加载器配置
    config: LoaderConfig,
    // dlopen 和符号解析是进程级操作，串行执行
    load_lock: Mutex<()>,
}

impl PluginLoader {
    /// 创建新的插件加载器
    pub fn new(plugins_directory: PathBuf, config: Option<LoaderConfig>) -> Self {
        Self {
            plugins_directory,
            config: config.unwrap_or_default(),
            load_lock: Mutex::new(()),
        }
    }

    /// 插件目录
    pub fn plugins_directory(&self) -> &Path {
        &self.plugins_directory
    }

    /// 扫描插件目录，返回按文件名排序的候选动态库
    pub fn scan_plugins(&self) -> DataFetchResult<Vec<PathBuf>> {
        debug!("扫描插件目录: {}", self.plugins_directory.display());

        if !self.plugins_directory.is_dir() {
            warn!("插件目录不存在: {}", self.plugins_directory.display());
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.plugins_directory)
            .map_err(|e| DataFetchError::io(format!("读取插件目录失败: {}", e)))?;

        let mut candidates = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DataFetchError::io(format!("读取目录条目失败: {}", e)))?
                .path();

            if path.is_file() && self.is_supported(&path) {
                candidates.push(path);
            }
        }
        candidates.sort();

        info!("扫描到 {} 个插件文件", candidates.len());

        Ok(candidates)
    }

    /// 是否为支持的动态库扩展名
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.config.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// 解析插件路径：绝对路径原样使用，相对路径按插件目录解析
    pub fn resolve_plugin_path(&self, source: &str) -> DataFetchResult<PathBuf> {
        let direct = PathBuf::from(source);
        let path = if direct.is_absolute() {
            direct
        } else {
            self.plugins_directory.join(source)
        };

        if !path.is_file() {
            return Err(DataFetchError::not_found(format!(
                "插件文件不存在: {}",
                path.display()
            )));
        }

        Ok(path)
    }

    /// 检查插件文件的扩展名和位置，返回规范化后的路径
    ///
    /// 符号链接和 `..` 先展开再比较，未开启 `allow_external_paths` 时
    /// 文件必须位于插件目录内。
    pub fn check_plugin_location(&self, path: &Path) -> DataFetchResult<PathBuf> {
        let path_text = path.display().to_string();

        if !self.is_supported(path) {
            return Err(DataFetchError::library_load(
                path_text,
                format!("不支持的扩展名，允许: {}", self.config.extensions.join(", ")),
            ));
        }

        let canonical = fs::canonicalize(path)
            .map_err(|e| DataFetchError::io(format!("解析插件路径失败: {}", e)))?;
        if self.config.allow_external_paths {
            return Ok(canonical);
        }

        let inside = fs::canonicalize(&self.plugins_directory)
            .map(|directory| canonical.starts_with(directory))
            .unwrap_or(false);
        if !inside {
            warn!(path = %path_text, "拒绝加载插件目录之外的文件");
            return Err(DataFetchError::library_load(
                path_text,
                format!("文件不在插件目录 {} 内", self.plugins_directory.display()),
            ));
        }

        Ok(canonical)
    }

    /// 检查插件大小，返回文件字节数
    pub fn check_plugin_size(&self, path: &Path) -> DataFetchResult<u64> {
        let metadata = fs::metadata(path)
            .map_err(|e| DataFetchError::io(format!("获取文件元数据失败: {}", e)))?;

        let size_mb = metadata.len() / (1024 * 1024);
        if size_mb > self.config.max_plugin_size_mb {
            return Err(DataFetchError::library_load(
                path.display().to_string(),
                format!(
                    "插件文件太大: {}MB，最大允许: {}MB",
                    size_mb, self.config.max_plugin_size_mb
                ),
            ));
        }

        Ok(metadata.len())
    }

    /// 计算文件校验和
    pub fn calculate_checksum(&self, path: &Path) -> DataFetchResult<String> {
        let content =
            fs::read(path).map_err(|e| DataFetchError::io(format!("读取文件失败: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&content);
        let result = hasher.finalize();

        Ok(format!("{:x}", result))
    }

    /// 加载动态库并解析入口函数
    ///
    /// 此处只做符号解析，不调用任何插件函数；版本和 ID 检查由注册表完成。
    pub fn load_library(&self, source: &str) -> DataFetchResult<NativeConnector> {
        let path = self.resolve_plugin_path(source)?;
        let path = self.check_plugin_location(&path)?;
        let size_bytes = self.check_plugin_size(&path)?;
        let checksum = if self.config.compute_checksum {
            Some(self.calculate_checksum(&path)?)
        } else {
            None
        };

        let path_text = path.display().to_string();
        debug!(path = %path_text, size_bytes, "加载动态库");

        let (library, entry) = {
            let _guard = lock(&self.load_lock);

            let library = unsafe { Library::new(&path) }
                .map_err(|e| DataFetchError::library_load(&path_text, e.to_string()))?;
            let table = unsafe { resolve_table(&library) };
            let entry = EntryPoints::from_table(&table, &path_text)?;
            (Arc::new(library), entry)
        };

        Ok(NativeConnector {
            entry,
            source: PluginSource::Library {
                path: path_text,
                size_bytes,
                checksum,
            },
            call_lock: Mutex::new(()),
            _library: Some(library),
        })
    }
}

/// 插件加载器工厂
pub struct PluginLoaderFactory;

impl PluginLoaderFactory {
    /// 根据插件配置创建加载器
    pub fn create(config: &PluginsConfig) -> PluginLoader {
        PluginLoader::new(config.directory_path(), Some(LoaderConfig::from(config)))
    }
}

/// 读取插件导出：优先使用 `ConnectorPlugin` 函数表，否则逐个查找入口函数
///
/// # Safety
///
/// `library` 中同名符号必须符合 ABI 约定的类型。
unsafe fn resolve_table(library: &Library) -> ConnectorPlugin {
    let table = unsafe { library.get::<*const ConnectorPlugin>(PLUGIN_TABLE_SYMBOL.as_bytes()) };
    if let Ok(symbol) = table {
        let table_ptr = *symbol;
        if !table_ptr.is_null() {
            return unsafe { *table_ptr };
        }
    }

    unsafe {
        ConnectorPlugin {
            get_info: lookup::<GetConnectorInfoFn>(library, GET_CONNECTOR_INFO_SYMBOL),
            get_config_fields: lookup::<GetConfigFieldsFn>(library, GET_CONFIG_FIELDS_SYMBOL),
            create_session: lookup::<CreateSessionFn>(library, CREATE_SESSION_SYMBOL),
            destroy_session: lookup::<DestroySessionFn>(library, DESTROY_SESSION_SYMBOL),
            test_connect: lookup::<TestConnectFn>(library, TEST_CONNECT_SYMBOL)
                .or_else(|| lookup::<TestConnectFn>(library, TEST_CONNECTION_SYMBOL)),
            fetch_data: lookup::<FetchDataFn>(library, FETCH_DATA_SYMBOL),
        }
    }
}

unsafe fn lookup<T: Copy>(library: &Library, name: &str) -> Option<T> {
    unsafe { library.get::<T>(name.as_bytes()) }
        .ok()
        .map(|symbol| *symbol)
}

/// 解析完成的入口函数
#[derive(Clone, Copy)]
struct EntryPoints {
    get_info: GetConnectorInfoFn,
    get_config_fields: GetConfigFieldsFn,
    create_session: CreateSessionFn,
    destroy_session: DestroySessionFn,
    test_connect: TestConnectFn,
    fetch_data: FetchDataFn,
}

impl EntryPoints {
    /// 函数表中任一入口为空都视为缺少导出
    fn from_table(table: &ConnectorPlugin, source: &str) -> DataFetchResult<Self> {
        let missing = |symbol: &str| DataFetchError::missing_export(source, symbol);

        Ok(Self {
            get_info: table.get_info.ok_or_else(|| missing(GET_CONNECTOR_INFO_SYMBOL))?,
            get_config_fields: table
                .get_config_fields
                .ok_or_else(|| missing(GET_CONFIG_FIELDS_SYMBOL))?,
            create_session: table
                .create_session
                .ok_or_else(|| missing(CREATE_SESSION_SYMBOL))?,
            destroy_session: table
                .destroy_session
                .ok_or_else(|| missing(DESTROY_SESSION_SYMBOL))?,
            test_connect: table.test_connect.ok_or_else(|| missing(TEST_CONNECT_SYMBOL))?,
            fetch_data: table.fetch_data.ok_or_else(|| missing(FETCH_DATA_SYMBOL))?,
        })
    }
}

/// 基于 C ABI 函数表的连接器
///
/// 所有入口调用都持有 `call_lock`，插件返回的缓冲区在锁内复制完成。
pub struct NativeConnector {
    entry: EntryPoints,
    source: PluginSource,
    call_lock: Mutex<()>,
    // 最后释放，保证入口函数在连接器存活期间有效
    _library: Option<Arc<Library>>,
}

impl NativeConnector {
    /// 包装宿主进程内的函数表
    pub fn from_table(name: &str, table: &ConnectorPlugin) -> DataFetchResult<Self> {
        let entry = EntryPoints::from_table(table, name)?;

        Ok(Self {
            entry,
            source: PluginSource::Builtin {
                name: name.to_string(),
            },
            call_lock: Mutex::new(()),
            _library: None,
        })
    }

    /// 复制一个配置项
    ///
    /// # Safety
    ///
    /// `field` 中的指针必须为空或指向有效的 C 字符串。
    unsafe fn copy_field(field: &ConfigField) -> Result<ConfigFieldSpec, BoundaryError> {
        unsafe {
            Ok(ConfigFieldSpec {
                key: copy_c_string(field.key).ok_or(BoundaryError::NullField {
                    field: "ConfigField.key",
                })?,
                label: copy_c_string(field.label).unwrap_or_default(),
                field_type: copy_c_string(field.field_type).ok_or(BoundaryError::NullField {
                    field: "ConfigField.type",
                })?,
                default_value: copy_c_string(field.default_value).unwrap_or_default(),
                options: copy_c_string(field.options),
            })
        }
    }
}

impl Connector for NativeConnector {
    fn describe(&self) -> Result<ConnectorDescriptor, BoundaryError> {
        let _guard = lock(&self.call_lock);

        let info = unsafe { (self.entry.get_info)() };
        if info.is_null() {
            return Err(BoundaryError::NullReturn {
                entry: GET_CONNECTOR_INFO_SYMBOL,
            });
        }

        let info = unsafe { &*info };
        unsafe {
            Ok(ConnectorDescriptor {
                id: copy_c_string(info.id).ok_or(BoundaryError::NullField {
                    field: "ConnectorInfo.id",
                })?,
                name: copy_c_string(info.name).unwrap_or_default(),
                description: copy_c_string(info.description).unwrap_or_default(),
                api_version: info.api_version,
            })
        }
    }

    fn config_fields(&self) -> Result<Vec<ConfigFieldSpec>, BoundaryError> {
        let _guard = lock(&self.call_lock);

        let mut count: c_int = 0;
        let fields = unsafe { (self.entry.get_config_fields)(&mut count) };
        let len = usize::try_from(count).map_err(|_| BoundaryError::InvalidCount { count })?;
        if len == 0 {
            return Ok(Vec::new());
        }
        if fields.is_null() {
            return Err(BoundaryError::NullReturn {
                entry: GET_CONFIG_FIELDS_SYMBOL,
            });
        }

        let raw = unsafe { std::slice::from_raw_parts(fields, len) };
        raw.iter()
            .map(|field| unsafe { Self::copy_field(field) })
            .collect()
    }

    fn create_session(&self, config_json: &str) -> Result<RawSession, BoundaryError> {
        let config = CString::new(config_json).map_err(|_| BoundaryError::InteriorNul)?;

        let _guard = lock(&self.call_lock);
        let session = unsafe { (self.entry.create_session)(config.as_ptr()) };

        RawSession::new(session).ok_or(BoundaryError::NullReturn {
            entry: CREATE_SESSION_SYMBOL,
        })
    }

    fn destroy_session(&self, session: RawSession) {
        let _guard = lock(&self.call_lock);
        unsafe { (self.entry.destroy_session)(session.as_ptr()) };
    }

    fn test_connect(&self, session: &RawSession) -> bool {
        let _guard = lock(&self.call_lock);
        unsafe { (self.entry.test_connect)(session.as_ptr()) }
    }

    fn fetch_data(&self, session: &RawSession) -> Result<String, BoundaryError> {
        let _guard = lock(&self.call_lock);

        let payload = unsafe { (self.entry.fetch_data)(session.as_ptr()) };
        if payload.is_null() {
            return Err(BoundaryError::NullReturn {
                entry: FETCH_DATA_SYMBOL,
            });
        }

        let raw = unsafe { CStr::from_ptr(payload) };
        match raw.to_str() {
            Ok(text) => Ok(text.to_string()),
            Err(e) => {
                warn!(
                    source = %self.source,
                    size_bytes = raw.to_bytes().len(),
                    valid_up_to = e.valid_up_to(),
                    "FetchData 返回了非法 UTF-8，已替换为 U+FFFD"
                );
                Ok(raw.to_string_lossy().into_owned())
            }
        }
    }

    fn source(&self) -> &PluginSource {
        &self.source
    }
}
