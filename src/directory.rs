use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{AcmeError, ProtocolError, Result},
    http::HttpClient,
};

/// ACME 目錄：邏輯操作名稱到實際端點 URL 的對應。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// 用於取得新的 nonce 值的 API 路徑。
    pub new_nonce: String,
    /// 用於新帳號註冊的 API 路徑。
    pub new_account: String,
    /// 用於建立訂單的 API 路徑。
    pub new_order: String,
    /// 帳戶金鑰輪替的 API 路徑。
    pub key_change: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoke_cert: Option<String>,
    /// 用於取得續期資訊的 API 路徑，可能不存在。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Directory {
    /// 從目錄 URL 取得目錄資料。
    ///
    /// # Errors
    ///
    /// 非 2xx 回應為 [`ProtocolError`]；內容無法解析為目錄時視為協定違規。
    pub fn fetch<C: HttpClient>(http: &C, url: &str) -> Result<Self> {
        debug!("Fetching ACME directory from {}", url);
        let response = http.get(url)?;
        if !response.is_success() {
            return Err(ProtocolError::from_response(&response).into());
        }

        response
            .json()
            .map_err(|e| AcmeError::ProtocolViolation(format!("Malformed directory: {}", e)))
    }

    /// 服務條款的 URL（若伺服器有提供）。
    pub fn terms_of_service(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("termsOfService"))
            .and_then(Value::as_str)
    }
}
