//! 簽名請求的傳輸層：快取目錄、維持單一 nonce，並把非 2xx 回應轉為 [`ProtocolError`]。

use log::{debug, warn};

use crate::{
    directory::Directory,
    error::{ProtocolError, Result},
    http::{HttpClient, HttpResponse, ReqwestClient},
    jws::{sign_jws, Payload},
    key_pair::KeyPair,
    nonce::{fetch_nonce, NonceCache, REPLAY_NONCE},
    protection::ProtectedHeader,
};

/// 對單一 ACME 伺服器的傳輸層。
///
/// 持有唯一的 nonce 快取，所有方法皆為阻塞式且需要 `&mut self`，
/// 因此同一個實例無法被並行的訂單共用。
#[derive(Debug)]
pub struct Transport<C: HttpClient = ReqwestClient> {
    http: C,
    directory_url: String,
    directory: Option<Directory>,
    nonce: NonceCache,
}

impl<C: HttpClient> Transport<C> {
    pub fn new(http: C, directory_url: impl Into<String>) -> Self {
        Self {
            http,
            directory_url: directory_url.into(),
            directory: None,
            nonce: NonceCache::new(),
        }
    }

    pub fn http(&self) -> &C {
        &self.http
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// 取得目錄，第一次呼叫時向伺服器取得並於實例存續期間快取，不會自動重新整理。
    pub fn directory(&mut self) -> Result<&Directory> {
        let directory = match self.directory.take() {
            Some(directory) => directory,
            None => Directory::fetch(&self.http, &self.directory_url)?,
        };
        Ok(self.directory.insert(directory))
    }

    /// 取出快取的 nonce；若無則向 `newNonce` 取得新值。
    fn next_nonce(&mut self) -> Result<String> {
        if let Some(nonce) = self.nonce.take() {
            return Ok(nonce);
        }
        let url = self.directory()?.new_nonce.clone();
        fetch_nonce(&self.http, &url)
    }

    /// 送出一次簽名請求。
    ///
    /// 使用的 nonce 在送出前即自快取中移除；只有 2xx 回應帶回的新 nonce 會被保留，
    /// 任何失敗都會讓下一次請求重新取得 nonce。
    ///
    /// # 參數
    ///
    /// - `url`: 目標端點，同時寫入保護標頭的 `url` 欄位。
    /// - `payload`: 負載；POST-as-GET 請使用 [`Payload::Empty`]。
    /// - `key`: 簽名金鑰。
    /// - `kid`: 帳戶 URL；為 `None` 時在標頭嵌入 JWK。
    ///
    /// # Errors
    ///
    /// 網路錯誤為 [`crate::http::HttpError`]，非 2xx 回應為 [`ProtocolError`]。
    pub fn signed_request(
        &mut self,
        url: &str,
        payload: &Payload,
        key: &KeyPair,
        kid: Option<&str>,
    ) -> Result<HttpResponse> {
        let nonce = self.next_nonce()?;
        let header = ProtectedHeader::new(url).nonce(nonce).kid(kid);
        let body = sign_jws(&header, payload, key)?.to_json()?;

        debug!("POST {}", url);
        let response = match self.http.post_jose(url, body) {
            Ok(response) => response,
            Err(e) => {
                warn!("Request to {} failed: {}", url, e);
                self.nonce.discard();
                return Err(e.into());
            }
        };
        debug!("POST {} -> {}", url, response.status);

        if !response.is_success() {
            self.nonce.discard();
            let error = ProtocolError::from_response(&response);
            debug!("Server rejected request to {}: {}", url, error);
            return Err(error.into());
        }

        if let Some(nonce) = response.header(REPLAY_NONCE) {
            self.nonce.store(nonce);
        }
        Ok(response)
    }
}
