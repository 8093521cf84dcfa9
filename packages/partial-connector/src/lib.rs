// 不完整的连接器
// 逐个导出入口函数但没有 FetchData，宿主加载时应报告缺少该导出

#![allow(non_snake_case)]

use std::ffi::{c_char, c_int, c_void};
use std::ptr;

use data_fetch_abi::{ConfigField, ConnectorInfo};

static INFO: ConnectorInfo = ConnectorInfo::new(
    c"com.example.partial",
    c"不完整",
    c"没有 FetchData 导出",
);

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
        unsafe { *count = 0 };
    }
    ptr::null()
}

#[unsafe(no_mangle)]
pub extern "C" fn CreateSession(_config_json: *const c_char) -> *mut c_void {
    ptr::null_mut()
}

#[unsafe(no_mangle)]
pub extern "C" fn DestroySession(_session: *mut c_void) {}

#[unsafe(no_mangle)]
pub extern "C" fn TestConnect(_session: *mut c_void) -> bool {
    false
}
