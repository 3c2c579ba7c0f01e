use log::debug;

use crate::{
    error::{AcmeError, ProtocolError, Result},
    http::HttpClient,
};

/// 伺服器回傳 nonce 所用的標頭名稱。
pub const REPLAY_NONCE: &str = "replay-nonce";

/// 單槽的 nonce 快取。
///
/// 任何時刻最多保存一個尚未使用的 nonce；`take` 取出後槽位即清空，
/// 因此同一個值不可能被兩個簽名請求使用。快取不會被持久化。
#[derive(Debug, Default)]
pub struct NonceCache {
    current: Option<String>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出目前的 nonce 並清空槽位。
    pub fn take(&mut self) -> Option<String> {
        self.current.take()
    }

    /// 以回應中取得的新 nonce 取代舊值。
    pub fn store(&mut self, nonce: impl Into<String>) {
        self.current = Some(nonce.into());
    }

    /// 丟棄目前的 nonce，迫使下一次請求重新取得。
    pub fn discard(&mut self) {
        if self.current.take().is_some() {
            debug!("Discarded cached nonce");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

/// 以 HEAD 請求向 `newNonce` 端點取得新的 nonce。
///
/// # Errors
///
/// 非 2xx 回應轉為 [`ProtocolError`]；回應缺少 `Replay-Nonce` 標頭視為協定違規。
pub fn fetch_nonce<C: HttpClient>(http: &C, url: &str) -> Result<String> {
    let response = http.head(url)?;
    if !response.is_success() {
        return Err(ProtocolError::from_response(&response).into());
    }

    match response.header(REPLAY_NONCE) {
        Some(nonce) => {
            debug!("Fetched fresh nonce from {}", url);
            Ok(nonce.to_string())
        }
        None => Err(AcmeError::ProtocolViolation(
            "No Replay-Nonce header found in response".to_string(),
        )),
    }
}
