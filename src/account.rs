//! 模塊提供 ACME 帳戶管理相關的功能，包括帳戶創建、查詢、更新、金鑰輪替與停用。

use log::{debug, info};
use serde::Deserialize;

use crate::{
    directory::Directory,
    error::{AcmeError, Result},
    http::{HttpClient, HttpResponse, ReqwestClient},
    jws::{sign_jws, Payload},
    key_pair::KeyPair,
    payload::{
        AccountDeactivationPayload, AccountUpdatePayload, KeyChangePayload, NewAccountPayload,
        PayloadT,
    },
    protection::ProtectedHeader,
    transport::Transport,
};

/// 伺服器回報的帳戶狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Valid,
    Deactivated,
    Revoked,
}

#[derive(Debug, Deserialize)]
struct AccountObject {
    status: AccountStatus,
}

/// 表示 ACME 帳戶的結構體，持有帳戶金鑰與傳輸層。
///
/// 帳戶 URL 會被快取；設定新金鑰或停用帳戶時快取失效。
#[derive(Debug)]
pub struct Account<C: HttpClient = ReqwestClient> {
    transport: Transport<C>,
    key: KeyPair,
    account_url: Option<String>,
}

impl<C: HttpClient> Account<C> {
    pub fn new(transport: Transport<C>, key: KeyPair) -> Self {
        Self {
            transport,
            key,
            account_url: None,
        }
    }

    /// 目前使用中的帳戶金鑰。
    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    /// 更換帳戶金鑰（不與伺服器互動），同時清除快取的帳戶 URL。
    pub fn set_key(&mut self, key: KeyPair) {
        self.key = key;
        self.account_url = None;
    }

    /// 設定已知的帳戶 URL，可省去一次 `newAccount` 查詢。
    pub fn set_account_url(&mut self, account_url: impl Into<String>) {
        self.account_url = Some(account_url.into());
    }

    pub fn cached_account_url(&self) -> Option<&str> {
        self.account_url.as_deref()
    }

    pub fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    pub fn directory(&mut self) -> Result<&Directory> {
        self.transport.directory()
    }

    /// 帳戶金鑰的 RFC 7638 縮影。
    pub fn thumbprint(&self) -> Result<String> {
        Ok(self.key.thumbprint()?)
    }

    /// 取得帳戶 URL，未快取時以 `onlyReturnExisting` 向伺服器查詢。
    ///
    /// # Errors
    ///
    /// 帳戶不存在時回傳 [`AcmeError::AccountNotFound`]。
    pub fn account_url(&mut self) -> Result<String> {
        if let Some(url) = &self.account_url {
            return Ok(url.clone());
        }
        self.lookup_existing()?.ok_or(AcmeError::AccountNotFound)
    }

    /// 註冊新帳戶並回傳帳戶 URL。
    ///
    /// 以相同金鑰重複註冊時，伺服器通常回傳既有帳戶。
    ///
    /// # 參數
    ///
    /// - `contacts`: 聯絡資訊，未帶 scheme 的電子郵件會補上 `mailto:`。
    pub fn create<S: AsRef<str>>(&mut self, contacts: &[S]) -> Result<String> {
        let response = self.new_account(&NewAccountPayload::new(contacts))?;
        let url = location(&response)?;
        info!("Account registered: {}", url);
        self.account_url = Some(url.clone());
        Ok(url)
    }

    /// 查詢與目前金鑰對應的既有帳戶，不會建立新帳戶。
    ///
    /// 伺服器回應 403 或 `accountDoesNotExist` 時回傳 `None`。
    pub fn lookup_existing(&mut self) -> Result<Option<String>> {
        let response = match self.query_existing()? {
            Some(response) => response,
            None => return Ok(None),
        };
        let url = location(&response)?;
        self.account_url = Some(url.clone());
        Ok(Some(url))
    }

    /// 查詢帳戶狀態；帳戶不存在（或已停用而被拒絕）時回傳 `None`。
    pub fn status(&mut self) -> Result<Option<AccountStatus>> {
        let response = match self.query_existing()? {
            Some(response) => response,
            None => return Ok(None),
        };
        let account: AccountObject = response
            .json()
            .map_err(|e| AcmeError::ProtocolViolation(format!("Malformed account object: {}", e)))?;
        Ok(Some(account.status))
    }

    /// 更新帳戶的聯絡資訊。
    pub fn update<S: AsRef<str>>(&mut self, contacts: &[S]) -> Result<()> {
        let url = self.account_url()?;
        self.post(&url, &AccountUpdatePayload::new(contacts).to_payload()?)?;
        Ok(())
    }

    /// 帳戶金鑰輪替。
    ///
    /// 內層 JWS 以**新**金鑰簽名（嵌入新金鑰的 JWK、不帶 nonce），負載為帳戶 URL 與舊金鑰的 JWK；
    /// 外層以帳戶 URL 為 `kid`、以**舊**金鑰簽名。只有在伺服器接受後才替換使用中的金鑰並清除
    /// 快取的帳戶 URL，下次使用時以新金鑰重新查詢；失敗時舊金鑰保持不變。
    /// 呼叫前應先保存新金鑰以免遺失。
    pub fn rotate_key(&mut self, new_key: KeyPair) -> Result<()> {
        let account_url = self.account_url()?;
        let key_change_url = self.transport.directory()?.key_change.clone();

        let inner_payload =
            KeyChangePayload::new(account_url.as_str(), self.key.jwk()?.to_value()?).to_payload()?;
        let inner = sign_jws(&ProtectedHeader::new(key_change_url.as_str()), &inner_payload, &new_key)?;

        self.transport.signed_request(
            &key_change_url,
            &Payload::Json(inner.to_value()?),
            &self.key,
            Some(&account_url),
        )?;

        info!("Account key rolled over for {}", account_url);
        self.key = new_key;
        self.account_url = None;
        Ok(())
    }

    /// 停用帳戶並清除快取的帳戶 URL。
    pub fn deactivate(&mut self) -> Result<()> {
        let url = self.account_url()?;
        self.post(&url, &AccountDeactivationPayload::default().to_payload()?)?;
        info!("Account deactivated: {}", url);
        self.account_url = None;
        Ok(())
    }

    /// 以帳戶 URL 作為 `kid` 送出簽名請求。
    ///
    /// 帳戶 URL 在取得 nonce 之前解析，避免查詢請求打亂 nonce 順序。
    pub fn post(&mut self, url: &str, payload: &Payload) -> Result<HttpResponse> {
        let kid = self.account_url()?;
        self.transport
            .signed_request(url, payload, &self.key, Some(&kid))
    }

    /// POST-as-GET：負載為空字串的簽名請求。
    pub fn post_as_get(&mut self, url: &str) -> Result<HttpResponse> {
        self.post(url, &Payload::Empty)
    }

    fn new_account(&mut self, payload: &NewAccountPayload) -> Result<HttpResponse> {
        let url = self.transport.directory()?.new_account.clone();
        self.transport
            .signed_request(&url, &payload.to_payload()?, &self.key, None)
    }

    fn query_existing(&mut self) -> Result<Option<HttpResponse>> {
        match self.new_account(&NewAccountPayload::only_return_existing()) {
            Ok(response) => Ok(Some(response)),
            Err(AcmeError::Protocol(e)) if e.status == 403 || e.is_account_does_not_exist() => {
                debug!("No existing account: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn location(response: &HttpResponse) -> Result<String> {
    response
        .header("location")
        .map(str::to_string)
        .ok_or_else(|| AcmeError::ProtocolViolation("Location header not found".to_string()))
}
