//! 單一域名組的持久化執行狀態，以及保存它的儲存實作。

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    backoff::RateLimit,
    challenge::{Authorization, SentChallenge},
    domain::state_basename,
    order::{OrderSnapshot, OrderState},
};

/// 目前的狀態檔格式版本。
pub const STATE_VERSION: u32 = 1;

/// 狀態儲存可能發生的錯誤。
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("State file is corrupted: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported state version: {0}")]
    UnsupportedVersion(u32),
    #[error("Lock poisoned")]
    LockPoisoned,
}

type Result<T> = std::result::Result<T, StateError>;

fn default_version() -> u32 {
    STATE_VERSION
}

/// 一次訂單處理的持久化紀錄。
///
/// 每次狀態轉換後都會整筆保存；前一次執行已到達終結狀態時會被重設。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub current_state: OrderState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSnapshot>,
    /// 各授權 URL 最後一次查詢到的授權物件。
    #[serde(default)]
    pub authz_statuses: BTreeMap<String, Authorization>,
    /// 已送出挑戰的授權 URL 及其挑戰紀錄。
    #[serde(default)]
    pub challenges_sent: BTreeMap<String, SentChallenge>,
    /// 已佈署驗證資料、尚待清理的授權 URL。
    #[serde(default)]
    pub authz_need_cleanup: BTreeSet<String>,
    #[serde(default)]
    pub rate_limits: BTreeMap<String, RateLimit>,
    /// 自動產生的憑證私鑰（PEM）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// 下載的憑證鏈（PEM）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            current_state: OrderState::New,
            order_url: None,
            order: None,
            authz_statuses: BTreeMap::new(),
            challenges_sent: BTreeMap::new(),
            authz_need_cleanup: BTreeSet::new(),
            rate_limits: BTreeMap::new(),
            private_key: None,
            certificate: None,
        }
    }
}

impl RunState {
    /// 解析狀態檔內容，拒絕比目前更新的格式版本。
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(data)?;
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .map_or(STATE_VERSION, |v| u32::try_from(v).unwrap_or(u32::MAX));
        if version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion(version));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// 以縮排 JSON 輸出。
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// 定義執行狀態的持久化介面。
pub trait StateStore: fmt::Debug {
    /// 讀取先前保存的狀態；不存在時回傳 `None`。
    fn load(&self) -> Result<Option<RunState>>;

    /// 以原子方式取代保存的狀態。
    fn save(&self, state: &RunState) -> Result<()>;
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn load(&self) -> Result<Option<RunState>> {
        (**self).load()
    }

    fn save(&self, state: &RunState) -> Result<()> {
        (**self).save(state)
    }
}

/// 基於檔案的狀態儲存，檔名為 `<主要域名>.<suffix>.json`。
///
/// 保存時先寫入同目錄下的暫存檔並 `fsync`，再以 rename 取代正式檔案，
/// 寫入途中中斷不會破壞先前的狀態。
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
    basename: String,
    path: PathBuf,
}

impl FileStateStore {
    /// 建立狀態儲存。
    ///
    /// # 參數
    ///
    /// - `dir`: 狀態檔所在目錄，保存時若不存在會自動建立。
    /// - `primary_domain`: 訂單的第一個域名，用於推導檔名。
    /// - `suffix`: 檔名後綴，例如 `"acme"`。
    pub fn new(dir: impl Into<PathBuf>, primary_domain: &str, suffix: &str) -> Self {
        let dir = dir.into();
        let basename = state_basename(primary_domain);
        let path = dir.join(format!("{}.{}.json", basename, suffix));
        Self {
            dir,
            basename,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 刪除狀態檔，下次處理時會建立新的訂單。
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed state file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<RunState>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(RunState::from_slice(&data)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &RunState) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let mut temp_file = tempfile::Builder::new()
            .prefix(&format!("{}.", self.basename))
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        temp_file.write_all(&state.to_vec()?)?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StateError::Io(e.error))?;

        debug!(
            "Saved state {} to {}",
            state.current_state,
            self.path.display()
        );
        Ok(())
    }
}

/// 記憶體中的狀態儲存，內容同樣以 JSON 保存。
///
/// 複製出的實例共享同一份資料，可用來模擬程序重啟後以相同狀態繼續處理。
#[derive(Debug, Clone, Default)]
pub struct MemStateStore {
    data: Arc<RwLock<Option<Vec<u8>>>>,
    saves: Arc<AtomicUsize>,
}

impl MemStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 至今呼叫 `save` 的次數。
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn clear(&self) -> Result<()> {
        *self.data.write().map_err(|_| StateError::LockPoisoned)? = None;
        Ok(())
    }
}

impl StateStore for MemStateStore {
    fn load(&self) -> Result<Option<RunState>> {
        let data = self.data.read().map_err(|_| StateError::LockPoisoned)?;
        data.as_deref().map(RunState::from_slice).transpose()
    }

    fn save(&self, state: &RunState) -> Result<()> {
        let encoded = state.to_vec()?;
        *self.data.write().map_err(|_| StateError::LockPoisoned)? = Some(encoded);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
