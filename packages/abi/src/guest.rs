// 插件侧适配层
// 用 Rust 编写连接器时，实现 Connector trait 即可得到符合 ABI 的导出函数表

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use crate::types::{ConfigField, ConnectorInfo, ConnectorPlugin};

/// 会话配置，键为 ConfigField.key，值均为字符串
pub type SessionConfig = HashMap<String, String>;

/// 连接器实现接口
///
/// 实现类型本身就是一个会话。所有 trait 方法中的 panic 都会在边界处被捕获，
/// 并转换为 ABI 规定的失败返回值（空指针或 false）。
pub trait Connector: Sized + 'static {
    /// 插件信息，必须指向静态数据
    fn info() -> &'static ConnectorInfo;

    /// 配置项列表，顺序即表单显示顺序
    fn config_fields() -> &'static [ConfigField];

    /// 根据配置创建会话，返回 `None` 表示拒绝该配置
    fn connect(config: SessionConfig) -> Option<Self>;

    /// 测试连接
    fn test_connect(&mut self) -> bool;

    /// 提取数据，返回 `None` 表示提取失败
    fn fetch_data(&mut self) -> Option<String>;
}

/// 会话在插件内的实际存储
struct SessionBox<C> {
    connector: C,
    // 最近一次 fetch_data 的结果，保证返回的指针在下一次调用前有效
    last_payload: Option<CString>,
}

impl ConnectorPlugin {
    /// 为连接器类型生成导出函数表
    pub const fn of<C: Connector>() -> Self {
        Self {
            get_info: Some(get_info::<C>),
            get_config_fields: Some(get_config_fields::<C>),
            create_session: Some(create_session::<C>),
            destroy_session: Some(destroy_session::<C>),
            test_connect: Some(test_connect::<C>),
            fetch_data: Some(fetch_data::<C>),
        }
    }
}

unsafe extern "C" fn get_info<C: Connector>() -> *const ConnectorInfo {
    catch_unwind(|| C::info() as *const ConnectorInfo).unwrap_or(ptr::null())
}

unsafe extern "C" fn get_config_fields<C: Connector>(count: *mut c_int) -> *const ConfigField {
    let fields = match catch_unwind(C::config_fields) {
        Ok(fields) => fields,
        Err(_) => &[],
    };
    if !count.is_null() {
        unsafe { *count = fields.len() as c_int };
    }
    fields.as_ptr()
}

unsafe extern "C" fn create_session<C: Connector>(config_json: *const c_char) -> *mut c_void {
    if config_json.is_null() {
        return ptr::null_mut();
    }
    let raw = unsafe { CStr::from_ptr(config_json) };

    let connector = catch_unwind(AssertUnwindSafe(|| {
        let config: SessionConfig = serde_json::from_slice(raw.to_bytes()).ok()?;
        C::connect(config)
    }));

    match connector {
        Ok(Some(connector)) => {
            let session = Box::new(SessionBox {
                connector,
                last_payload: None,
            });
            Box::into_raw(session).cast()
        }
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn destroy_session<C: Connector>(session: *mut c_void) {
    if session.is_null() {
        return;
    }
    let session = unsafe { Box::from_raw(session.cast::<SessionBox<C>>()) };
    let _ = catch_unwind(AssertUnwindSafe(move || drop(session)));
}

unsafe extern "C" fn test_connect<C: Connector>(session: *mut c_void) -> bool {
    if session.is_null() {
        return false;
    }
    let session = unsafe { &mut *session.cast::<SessionBox<C>>() };
    catch_unwind(AssertUnwindSafe(|| session.connector.test_connect())).unwrap_or(false)
}

unsafe extern "C" fn fetch_data<C: Connector>(session: *mut c_void) -> *const c_char {
    if session.is_null() {
        return ptr::null();
    }
    let session = unsafe { &mut *session.cast::<SessionBox<C>>() };

    let payload = catch_unwind(AssertUnwindSafe(|| session.connector.fetch_data()))
        .ok()
        .flatten()
        .and_then(|payload| CString::new(payload).ok());

    session.last_payload = payload;
    session
        .last_payload
        .as_ref()
        .map_or(ptr::null(), |payload| payload.as_ptr())
}
