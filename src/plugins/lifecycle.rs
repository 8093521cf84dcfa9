// 会话生命周期管理
// 每个插件一张会话表，句柄为带代数校验的槽位索引

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::errors::{DataFetchError, DataFetchResult};
use crate::plugins::lock;
use crate::plugins::plugin_interface::{BoundaryError, Connector, RawSession};
use crate::plugins::plugin_registry::UnloadPolicy;

// 进程内唯一的代数，插件重新加载后旧句柄也不会命中新会话
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// 会话句柄
///
/// 不实现 `Clone`：销毁会话会消费句柄。文本形式为 `plugin_id:index:generation`。
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    plugin_id: String,
    index: usize,
    generation: u64,
}

impl SessionHandle {
    /// 所属插件
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.plugin_id, self.index, self.generation)
    }
}

impl FromStr for SessionHandle {
    type Err = DataFetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let generation = parts.next().and_then(|part| part.parse().ok());
        let index = parts.next().and_then(|part| part.parse().ok());
        let plugin_id = parts.next().filter(|id| !id.is_empty());

        match (plugin_id, index, generation) {
            (Some(plugin_id), Some(index), Some(generation)) => Ok(Self {
                plugin_id: plugin_id.to_string(),
                index,
                generation,
            }),
            _ => Err(DataFetchError::invalid_handle(s)),
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// 槽位已预留，插件尚未返回会话
    Uninitialized,
    /// 会话可用
    Created,
    /// 会话已销毁
    Destroyed,
}

/// 会话信息
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    /// 会话句柄
    pub handle: String,
    /// 所属插件
    pub plugin_id: String,
    /// 当前状态
    pub state: SessionState,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最近一次连接测试结果
    pub last_test: Option<bool>,
    /// 最近一次连接测试时间
    pub last_tested_at: Option<DateTime<Utc>>,
    /// 成功提取次数
    pub fetch_count: u64,
    /// 最近一次成功提取时间
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// 会话槽位
#[derive(Debug)]
pub struct SessionCell {
    generation: u64,
    state: SessionState,
    raw: Option<RawSession>,
    created_at: DateTime<Utc>,
    last_test: Option<bool>,
    last_tested_at: Option<DateTime<Utc>>,
    fetch_count: u64,
    last_fetched_at: Option<DateTime<Utc>>,
}

impl SessionCell {
    fn reserved(generation: u64) -> Self {
        Self {
            generation,
            state: SessionState::Uninitialized,
            raw: None,
            created_at: Utc::now(),
            last_test: None,
            last_tested_at: None,
            fetch_count: 0,
            last_fetched_at: None,
        }
    }

    fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && self.state == SessionState::Created
    }

    fn info(&self, plugin_id: &str, index: usize) -> SessionInfo {
        SessionInfo {
            handle: format!("{}:{}:{}", plugin_id, index, self.generation),
            plugin_id: plugin_id.to_string(),
            state: self.state,
            created_at: self.created_at,
            last_test: self.last_test,
            last_tested_at: self.last_tested_at,
            fetch_count: self.fetch_count,
            last_fetched_at: self.last_fetched_at,
        }
    }
}

#[derive(Default)]
struct Slots {
    cells: Vec<Arc<Mutex<SessionCell>>>,
    free: Vec<usize>,
    live: usize,
    retired: bool,
}

/// 插件的会话表
///
/// 锁顺序：槽位锁只在查找和计数时短暂持有，调用插件时只持有单个会话的锁。
pub struct SessionTable {
    plugin_id: String,
    connector: Arc<dyn Connector>,
    slots: Mutex<Slots>,
}

impl SessionTable {
    /// 创建会话表
    pub fn new(plugin_id: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            connector,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// 所属插件
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// 连接器
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// 创建会话：Uninitialized -> Created
    pub fn create(&self, config_json: &str) -> DataFetchResult<SessionHandle> {
        let (index, cell) = self.reserve()?;
        let mut guard = lock(&cell);

        match self.connector.create_session(config_json) {
            Ok(raw) => {
                guard.raw = Some(raw);
                guard.state = SessionState::Created;
                guard.created_at = Utc::now();

                let handle = SessionHandle {
                    plugin_id: self.plugin_id.clone(),
                    index,
                    generation: guard.generation,
                };
                info!(plugin_id = %self.plugin_id, handle = %handle, "会话已创建");
                Ok(handle)
            }
            Err(e) => {
                guard.state = SessionState::Destroyed;
                drop(guard);
                self.release(index);

                warn!(plugin_id = %self.plugin_id, error = %e, "插件拒绝创建会话");
                let message = match e {
                    BoundaryError::InteriorNul => "配置包含 NUL 字节".to_string(),
                    other => format!("插件拒绝了该配置 ({})", other),
                };
                Err(DataFetchError::invalid_config(&self.plugin_id, message))
            }
        }
    }

    /// 测试连接，不改变会话状态
    pub fn test_connect(&self, handle: &SessionHandle) -> DataFetchResult<bool> {
        let cell = self.live_cell(handle)?;
        let mut guard = lock(&cell);
        let raw = self.raw_of(&guard, handle)?;

        let connected = self.connector.test_connect(raw);
        guard.last_test = Some(connected);
        guard.last_tested_at = Some(Utc::now());

        debug!(plugin_id = %self.plugin_id, handle = %handle, connected, "连接测试完成");
        Ok(connected)
    }

    /// 提取数据，不改变会话状态
    pub fn fetch(&self, handle: &SessionHandle) -> DataFetchResult<String> {
        let cell = self.live_cell(handle)?;
        let mut guard = lock(&cell);
        let raw = self.raw_of(&guard, handle)?;

        match self.connector.fetch_data(raw) {
            Ok(payload) => {
                guard.fetch_count += 1;
                guard.last_fetched_at = Some(Utc::now());
                debug!(
                    plugin_id = %self.plugin_id,
                    handle = %handle,
                    bytes = payload.len(),
                    "数据提取完成"
                );
                Ok(payload)
            }
            Err(e) => {
                warn!(plugin_id = %self.plugin_id, handle = %handle, error = %e, "数据提取失败");
                Err(DataFetchError::fetch_failed(&self.plugin_id, handle.to_string()))
            }
        }
    }

    /// 销毁会话：Created -> Destroyed，重复销毁在调用插件前被拒绝
    pub fn destroy(&self, handle: SessionHandle) -> DataFetchResult<()> {
        let cell = self.live_cell(&handle)?;
        let mut guard = lock(&cell);
        if !guard.is_live(handle.generation) {
            return Err(self.use_after_destroy(&handle));
        }

        let raw = guard.raw.take();
        guard.state = SessionState::Destroyed;
        if let Some(raw) = raw {
            self.connector.destroy_session(raw);
        }
        drop(guard);
        self.release(handle.index);

        info!(plugin_id = %self.plugin_id, handle = %handle, "会话已销毁");
        Ok(())
    }

    /// 停止接受新会话
    ///
    /// `Refuse` 策略下仍有活动会话时返回 `PluginBusy` 且不做任何改变。
    pub fn retire(&self, policy: UnloadPolicy) -> DataFetchResult<()> {
        let mut slots = lock(&self.slots);
        if slots.live > 0 && policy == UnloadPolicy::Refuse {
            return Err(DataFetchError::plugin_busy(&self.plugin_id, slots.live));
        }
        slots.retired = true;
        Ok(())
    }

    /// 销毁所有活动会话，返回销毁数量
    pub fn destroy_all(&self) -> usize {
        let cells: Vec<(usize, Arc<Mutex<SessionCell>>)> = {
            let slots = lock(&self.slots);
            slots.cells.iter().cloned().enumerate().collect()
        };

        let mut destroyed = 0;
        for (index, cell) in cells {
            let mut guard = lock(&cell);
            if guard.state != SessionState::Created {
                continue;
            }
            let raw = guard.raw.take();
            guard.state = SessionState::Destroyed;
            if let Some(raw) = raw {
                self.connector.destroy_session(raw);
            }
            drop(guard);
            self.release(index);
            destroyed += 1;
        }

        if destroyed > 0 {
            info!(plugin_id = %self.plugin_id, destroyed, "已销毁剩余会话");
        }
        destroyed
    }

    /// 活动会话数（含正在创建的）
    pub fn live_count(&self) -> usize {
        lock(&self.slots).live
    }

    /// 会话信息
    pub fn info(&self, handle: &SessionHandle) -> DataFetchResult<SessionInfo> {
        let cell = self.live_cell(handle)?;
        let guard = lock(&cell);
        if !guard.is_live(handle.generation) {
            return Err(self.use_after_destroy(handle));
        }
        Ok(guard.info(&self.plugin_id, handle.index))
    }

    /// 所有活动会话
    pub fn list(&self) -> Vec<SessionInfo> {
        let cells: Vec<Arc<Mutex<SessionCell>>> = lock(&self.slots).cells.clone();

        cells
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| {
                let guard = lock(cell);
                (guard.state == SessionState::Created).then(|| guard.info(&self.plugin_id, index))
            })
            .collect()
    }

    fn reserve(&self) -> DataFetchResult<(usize, Arc<Mutex<SessionCell>>)> {
        let mut slots = lock(&self.slots);
        if slots.retired {
            return Err(DataFetchError::not_found(format!("连接器 {}", self.plugin_id)));
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let index = match slots.free.pop() {
            Some(index) => {
                *lock(&slots.cells[index]) = SessionCell::reserved(generation);
                index
            }
            None => {
                slots
                    .cells
                    .push(Arc::new(Mutex::new(SessionCell::reserved(generation))));
                slots.cells.len() - 1
            }
        };
        slots.live += 1;

        Ok((index, slots.cells[index].clone()))
    }

    fn release(&self, index: usize) {
        let mut slots = lock(&self.slots);
        slots.free.push(index);
        slots.live = slots.live.saturating_sub(1);
    }

    fn live_cell(&self, handle: &SessionHandle) -> DataFetchResult<Arc<Mutex<SessionCell>>> {
        if handle.plugin_id != self.plugin_id {
            return Err(DataFetchError::invalid_handle(handle.to_string()));
        }

        let slots = lock(&self.slots);
        match slots.cells.get(handle.index) {
            Some(cell) => Ok(cell.clone()),
            None => {
                drop(slots);
                Err(self.use_after_destroy(handle))
            }
        }
    }

    fn raw_of<'a>(
        &self,
        cell: &'a SessionCell,
        handle: &SessionHandle,
    ) -> DataFetchResult<&'a RawSession> {
        match (&cell.raw, cell.is_live(handle.generation)) {
            (Some(raw), true) => Ok(raw),
            _ => Err(self.use_after_destroy(handle)),
        }
    }

    fn use_after_destroy(&self, handle: &SessionHandle) -> DataFetchError {
        error!(plugin_id = %self.plugin_id, handle = %handle, "使用了已销毁或不存在的会话");
        DataFetchError::use_after_destroy(handle.to_string())
    }
}

impl Drop for SessionTable {
    fn drop(&mut self) {
        // 连接器字段在此之后释放，动态库晚于会话卸载
        self.destroy_all();
    }
}
