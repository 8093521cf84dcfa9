// 插件系统模块
// 动态加载连接器插件，维护注册表并管理会话生命周期

pub mod lifecycle;
pub mod plugin_interface;
pub mod plugin_loader;
pub mod plugin_manager;
pub mod plugin_registry;

#[cfg(test)]
mod tests;

pub use lifecycle::*;
pub use plugin_interface::*;
pub use plugin_loader::*;
pub use plugin_manager::*;
pub use plugin_registry::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// 获取互斥锁，插件调用中的 panic 不会让宿主状态永久不可用
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
