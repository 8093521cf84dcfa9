// 连接器 ABI 类型定义
// 与 C 头文件 connector.h 保持内存布局一致

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

/// ABI 版本号，用于向后兼容检查
pub const CONNECTOR_API_VERSION: u32 = 1;

/// 插件导出的函数表符号
pub const PLUGIN_TABLE_SYMBOL: &str = "ConnectorPlugin";

/// 逐个导出入口函数时使用的符号名
pub const GET_CONNECTOR_INFO_SYMBOL: &str = "GetConnectorInfo";
pub const GET_CONFIG_FIELDS_SYMBOL: &str = "GetConfigFields";
pub const CREATE_SESSION_SYMBOL: &str = "CreateSession";
pub const DESTROY_SESSION_SYMBOL: &str = "DestroySession";
pub const TEST_CONNECT_SYMBOL: &str = "TestConnect";
/// `TestConnect` 的旧名，按符号导出时同样接受
pub const TEST_CONNECTION_SYMBOL: &str = "TestConnection";
pub const FETCH_DATA_SYMBOL: &str = "FetchData";

/// 插件信息结构体
#[repr(C)]
#[derive(Debug)]
pub struct ConnectorInfo {
    /// 插件唯一 ID
    pub id: *const c_char,
    /// 插件名称
    pub name: *const c_char,
    /// 插件描述
    pub description: *const c_char,
    /// 插件 API 版本
    pub api_version: u32,
}

// 只指向插件内的只读静态字符串
unsafe impl Sync for ConnectorInfo {}

impl ConnectorInfo {
    /// 以当前 ABI 版本创建插件信息
    pub const fn new(id: &'static CStr, name: &'static CStr, description: &'static CStr) -> Self {
        Self {
            id: id.as_ptr(),
            name: name.as_ptr(),
            description: description.as_ptr(),
            api_version: CONNECTOR_API_VERSION,
        }
    }

    /// 声明其他 ABI 版本
    pub const fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }
}

/// 配置项定义，前端据此动态生成配置表单
#[repr(C)]
#[derive(Debug)]
pub struct ConfigField {
    /// 配置项的键
    pub key: *const c_char,
    /// 前端显示的标签
    pub label: *const c_char,
    /// 输入框类型（C 头文件中的 `type`）
    pub field_type: *const c_char,
    /// 默认值
    pub default_value: *const c_char,
    /// select 类型的选项 JSON 字符串
    pub options: *const c_char,
}

unsafe impl Sync for ConfigField {}

impl ConfigField {
    pub const fn new(key: &'static CStr, label: &'static CStr, field_type: &'static CStr) -> Self {
        Self {
            key: key.as_ptr(),
            label: label.as_ptr(),
            field_type: field_type.as_ptr(),
            default_value: c"".as_ptr(),
            options: ptr::null(),
        }
    }

    pub const fn with_default(mut self, default_value: &'static CStr) -> Self {
        self.default_value = default_value.as_ptr();
        self
    }

    pub const fn with_options(mut self, options: &'static CStr) -> Self {
        self.options = options.as_ptr();
        self
    }
}

// 导出的函数指针类型
pub type GetConnectorInfoFn = unsafe extern "C" fn() -> *const ConnectorInfo;
pub type GetConfigFieldsFn = unsafe extern "C" fn(count: *mut c_int) -> *const ConfigField;
pub type CreateSessionFn = unsafe extern "C" fn(config_json: *const c_char) -> *mut c_void;
pub type DestroySessionFn = unsafe extern "C" fn(session: *mut c_void);
pub type TestConnectFn = unsafe extern "C" fn(session: *mut c_void) -> bool;
pub type FetchDataFn = unsafe extern "C" fn(session: *mut c_void) -> *const c_char;

/// 插件导出的函数表，符号名为 `ConnectorPlugin`
///
/// 字段顺序与 C 头文件一致，不可调整。任何字段为空都视为缺少对应导出。
///
/// `fetch_data` 返回的缓冲区归插件所有，在同一会话的下一次调用或销毁之前有效，
/// 宿主必须立即复制，且不得释放。
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ConnectorPlugin {
    pub get_info: Option<GetConnectorInfoFn>,
    pub get_config_fields: Option<GetConfigFieldsFn>,
    pub create_session: Option<CreateSessionFn>,
    pub destroy_session: Option<DestroySessionFn>,
    pub test_connect: Option<TestConnectFn>,
    pub fetch_data: Option<FetchDataFn>,
}

impl ConnectorPlugin {
    /// 所有入口都为空的函数表
    pub const EMPTY: Self = Self {
        get_info: None,
        get_config_fields: None,
        create_session: None,
        destroy_session: None,
        test_connect: None,
        fetch_data: None,
    };

    /// 第一个缺失入口对应的导出符号名
    pub fn first_missing_entry(&self) -> Option<&'static str> {
        if self.get_info.is_none() {
            Some(GET_CONNECTOR_INFO_SYMBOL)
        } else if self.get_config_fields.is_none() {
            Some(GET_CONFIG_FIELDS_SYMBOL)
        } else if self.create_session.is_none() {
            Some(CREATE_SESSION_SYMBOL)
        } else if self.destroy_session.is_none() {
            Some(DESTROY_SESSION_SYMBOL)
        } else if self.test_connect.is_none() {
            Some(TEST_CONNECT_SYMBOL)
        } else if self.fetch_data.is_none() {
            Some(FETCH_DATA_SYMBOL)
        } else {
            None
        }
    }
}

/// 复制插件持有的 C 字符串，空指针返回 `None`
///
/// 非法 UTF-8 字节替换为 U+FFFD，需要区分时先用 `CStr::to_str` 检查。
///
/// # Safety
///
/// `ptr` 必须为空或指向以 NUL 结尾、在调用期间有效的字符串。
pub unsafe fn copy_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let raw = unsafe { CStr::from_ptr(ptr) };
    Some(raw.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_table_layout_matches_header() {
        // 六个可空函数指针，与 C 结构体一致
        assert_eq!(size_of::<ConnectorPlugin>(), 6 * size_of::<usize>());
        assert_eq!(align_of::<ConnectorPlugin>(), align_of::<usize>());
        assert_eq!(size_of::<ConfigField>(), 5 * size_of::<usize>());
    }

    #[test]
    fn test_first_missing_entry_order() {
        let table = ConnectorPlugin::EMPTY;
        assert_eq!(table.first_missing_entry(), Some("GetConnectorInfo"));
    }

    #[test]
    fn test_connector_info_constructor() {
        static INFO: ConnectorInfo =
            ConnectorInfo::new(c"postgres", c"PostgreSQL", c"关系型数据库").with_api_version(2);

        assert_eq!(INFO.api_version, 2);
        assert_eq!(unsafe { copy_c_string(INFO.id) }, Some("postgres".to_string()));
        assert_eq!(unsafe { copy_c_string(INFO.description) }, Some("关系型数据库".to_string()));
    }

    #[test]
    fn test_copy_null_string() {
        assert_eq!(unsafe { copy_c_string(ptr::null()) }, None);

        let field = ConfigField::new(c"host", c"主机", c"text");
        assert_eq!(unsafe { copy_c_string(field.default_value) }, Some(String::new()));
        assert_eq!(unsafe { copy_c_string(field.options) }, None);
    }
}
