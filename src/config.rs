use std::{fs, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    backoff::RetryPolicy,
    error::Result,
    http::ReqwestClient,
    key_pair::KeyPair,
    transport::Transport,
};

/// Let's Encrypt 正式環境的目錄 URL。
pub const LETS_ENCRYPT_DIRECTORY: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// Let's Encrypt 測試環境的目錄 URL。
pub const LETS_ENCRYPT_STAGING_DIRECTORY: &str =
    "https://acme-staging-v02.api.letsencrypt.org/directory";

/// 讀取設定檔可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// 客戶端設定，所有欄位皆有預設值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcmeConfig {
    pub directory_url: String,
    /// 自動產生的憑證私鑰長度。
    pub rsa_key_size: u32,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub retry_delay_min_secs: u64,
    pub retry_delay_max_secs: u64,
    /// `process_order_with_retry` 的嘗試次數上限。
    pub max_attempts: u32,
    /// 狀態檔名稱的後綴。
    pub state_suffix: String,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            directory_url: LETS_ENCRYPT_DIRECTORY.to_string(),
            rsa_key_size: KeyPair::DEFAULT_BITS,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            retry_delay_min_secs: 5,
            retry_delay_max_secs: 60,
            max_attempts: 5,
            state_suffix: "acme".to_string(),
        }
    }
}

impl AcmeConfig {
    /// 從 JSON 檔案讀取設定，未出現的欄位使用預設值。
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn directory_url(mut self, directory_url: &str) -> Self {
        self.directory_url = directory_url.to_string();
        self
    }

    pub fn rsa_key_size(mut self, bits: u32) -> Self {
        self.rsa_key_size = bits;
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// 設定線性退避的間隔與上限（秒）。
    pub fn retry_delay(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.retry_delay_min_secs = min_secs;
        self.retry_delay_max_secs = max_secs;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn state_suffix(mut self, suffix: &str) -> Self {
        self.state_suffix = suffix.to_string();
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.retry_delay_min_secs),
            Duration::from_secs(self.retry_delay_max_secs),
        )
    }

    /// 建立以 reqwest 為底層的傳輸層。
    pub fn transport(&self) -> Result<Transport<ReqwestClient>> {
        let client = ReqwestClient::new(
            &self.user_agent,
            Duration::from_secs(self.request_timeout_secs),
        )?;
        Ok(Transport::new(client, self.directory_url.as_str()))
    }
}
