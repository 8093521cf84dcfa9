// 静态数据连接器示例
// 不使用 ConnectorPlugin 函数表，按 C 头文件逐个导出入口函数，
// 连接测试沿用旧的 TestConnection 符号名

#![allow(non_snake_case)]

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

use data_fetch_abi::{ConfigField, ConnectorInfo};
use serde_json::Value;

static INFO: ConnectorInfo = ConnectorInfo::new(
    c"com.example.static",
    c"静态数据",
    c"返回配置中给定的 JSON 数据",
);

static FIELDS: [ConfigField; 1] =
    [ConfigField::new(c"rows", c"数据", c"text").with_default(c"[]")];

/// 会话只保存配置中的数据
struct StaticSession {
    rows: CString,
}

unsafe fn session_ref<'a>(session: *mut c_void) -> Option<&'a StaticSession> {
    unsafe { session.cast::<StaticSession>().as_ref() }
}

#[unsafe(no_mangle)]
pub extern "C" fn GetConnectorInfo() -> *const ConnectorInfo {
    &INFO
}

/// # Safety
///
/// `count` 必须为空或指向可写的 `c_int`。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn GetConfigFields(count: *mut c_int) -> *const ConfigField {
    if !count.is_null() {
        unsafe { *count = FIELDS.len() as c_int };
    }
    FIELDS.as_ptr()
}

/// # Safety
///
/// `config_json` 必须为空或指向以 NUL 结尾的 JSON 对象字符串。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn CreateSession(config_json: *const c_char) -> *mut c_void {
    if config_json.is_null() {
        return ptr::null_mut();
    }
    let raw = unsafe { CStr::from_ptr(config_json) };
    let Ok(config) = serde_json::from_slice::<HashMap<String, String>>(raw.to_bytes()) else {
        return ptr::null_mut();
    };

    let rows = config.get("rows").map_or("[]", String::as_str);
    match CString::new(rows) {
        Ok(rows) => Box::into_raw(Box::new(StaticSession { rows })).cast(),
        Err(_) => ptr::null_mut(),
    }
}

/// # Safety
///
/// `session` 必须为空或是 `CreateSession` 返回且尚未销毁的指针。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn DestroySession(session: *mut c_void) {
    if !session.is_null() {
        drop(unsafe { Box::from_raw(session.cast::<StaticSession>()) });
    }
}

/// 数据是合法 JSON 即视为连接成功
///
/// # Safety
///
/// 同 [`DestroySession`]。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn TestConnection(session: *mut c_void) -> bool {
    match unsafe { session_ref(session) } {
        Some(session) => serde_json::from_slice::<Value>(session.rows.as_bytes()).is_ok(),
        None => false,
    }
}

/// 返回的指针在会话销毁前有效
///
/// # Safety
///
/// 同 [`DestroySession`]。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn FetchData(session: *mut c_void) -> *const c_char {
    match unsafe { session_ref(session) } {
        Some(session) => session.rows.as_ptr(),
        None => ptr::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_fetch_abi::copy_c_string;

    fn create(config: &CStr) -> *mut c_void {
        unsafe { CreateSession(config.as_ptr()) }
    }

    #[test]
    fn test_fields_and_info() {
        let mut count: c_int = 0;
        let fields = unsafe { GetConfigFields(&mut count) };
        assert_eq!(count, 1);
        assert_eq!(unsafe { copy_c_string((*fields).key) }, Some("rows".to_string()));

        let info = unsafe { &*GetConnectorInfo() };
        assert_eq!(
            unsafe { copy_c_string(info.id) },
            Some("com.example.static".to_string())
        );
    }

    #[test]
    fn test_session_returns_configured_rows() {
        let session = create(c"{\"rows\":\"[{\\\"id\\\":1}]\"}");
        assert!(!session.is_null());

        assert!(unsafe { TestConnection(session) });
        assert_eq!(
            unsafe { copy_c_string(FetchData(session)) },
            Some("[{\"id\":1}]".to_string())
        );
        unsafe { DestroySession(session) };
    }

    #[test]
    fn test_invalid_rows_fail_connection() {
        let session = create(c"{\"rows\":\"not json\"}");
        assert!(!unsafe { TestConnection(session) });
        unsafe { DestroySession(session) };

        let session = create(c"{}");
        assert_eq!(unsafe { copy_c_string(FetchData(session)) }, Some("[]".to_string()));
        unsafe { DestroySession(session) };
    }

    #[test]
    fn test_rejects_non_object_config() {
        assert!(create(c"[1,2]").is_null());
        assert!(unsafe { CreateSession(ptr::null()) }.is_null());
        assert!(!unsafe { TestConnection(ptr::null_mut()) });
        assert!(unsafe { FetchData(ptr::null_mut()) }.is_null());
    }
}
