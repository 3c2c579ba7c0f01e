use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::idna_encode,
    error::{AcmeError, Result},
    jws::{base64url, Payload},
};

/// 定義所有 API 載荷（Payload）必須實作的功能。
///
/// 實作者提供自訂的驗證邏輯；`to_payload` 會先驗證再轉為可簽名的 [`Payload`]。
pub trait PayloadT: Serialize {
    /// 驗證載荷資料是否符合預期的規範。
    ///
    /// # 錯誤
    ///
    /// 若驗證失敗，則回傳對應的錯誤。
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// 驗證後轉為 JSON 負載。
    fn to_payload(&self) -> Result<Payload> {
        self.validate()?;
        Ok(Payload::Json(serde_json::to_value(self)?))
    }
}

/// 為未帶有 URI scheme 的聯絡資訊補上 `mailto:` 前綴。
pub fn normalize_contacts<S: AsRef<str>>(contacts: &[S]) -> Vec<String> {
    contacts
        .iter()
        .map(|contact| {
            let contact = contact.as_ref().trim();
            if contact.contains(':') {
                contact.to_string()
            } else {
                format!("mailto:{}", contact)
            }
        })
        .collect()
}

/// 表示建立或查詢帳號時送往 `newAccount` 的載荷資料。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountPayload {
    terms_of_service_agreed: bool,
    contact: Vec<String>,
    only_return_existing: bool,
}

impl NewAccountPayload {
    /// 建立新帳號的載荷，聯絡資訊會經過 [`normalize_contacts`]。
    pub fn new<S: AsRef<str>>(contacts: &[S]) -> Self {
        NewAccountPayload {
            terms_of_service_agreed: true,
            contact: normalize_contacts(contacts),
            only_return_existing: false,
        }
    }

    /// 僅查詢既有帳號、不建立新帳號的載荷。
    pub fn only_return_existing() -> Self {
        NewAccountPayload {
            terms_of_service_agreed: true,
            contact: Vec::new(),
            only_return_existing: true,
        }
    }
}

impl PayloadT for NewAccountPayload {
    fn validate(&self) -> Result<()> {
        if !self.terms_of_service_agreed {
            return Err(AcmeError::Invariant(
                "Terms of service must be agreed".to_string(),
            ));
        }
        Ok(())
    }
}

/// 更新帳號聯絡資訊的載荷。
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountUpdatePayload {
    contact: Vec<String>,
}

impl AccountUpdatePayload {
    pub fn new<S: AsRef<str>>(contacts: &[S]) -> Self {
        Self {
            contact: normalize_contacts(contacts),
        }
    }
}

impl PayloadT for AccountUpdatePayload {}

/// 停用帳號的載荷，內容固定為 `{"status": "deactivated"}`。
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountDeactivationPayload {
    status: String,
}

impl Default for AccountDeactivationPayload {
    fn default() -> Self {
        Self {
            status: "deactivated".to_string(),
        }
    }
}

impl PayloadT for AccountDeactivationPayload {}

/// 表示一個識別項，用來描述證書所涵蓋的主機名稱。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

/// 表示建立新訂單時所需的載荷資料。
#[derive(Debug, Serialize, Deserialize)]
pub struct NewOrderPayload {
    pub identifiers: Vec<Identifier>,
}

impl NewOrderPayload {
    /// 為每個域名建立類型為 `"dns"` 的識別項，域名先經 IDNA 編碼。
    ///
    /// # Errors
    ///
    /// 任一域名無法編碼時回傳 [`AcmeError::InvalidDomain`]。
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Result<Self> {
        let identifiers = domains
            .iter()
            .map(|domain| {
                Ok(Identifier {
                    type_: "dns".to_string(),
                    value: idna_encode(domain.as_ref())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NewOrderPayload { identifiers })
    }
}

impl PayloadT for NewOrderPayload {
    /// 必須至少包含一個識別項。
    fn validate(&self) -> Result<()> {
        if self.identifiers.is_empty() {
            return Err(AcmeError::InvalidDomain(
                "At least one identifier is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// 回應挑戰的載荷，內容為空物件 `{}`。
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ChallengeValidationPayload {}

impl PayloadT for ChallengeValidationPayload {}

/// 最終化訂單的載荷，`csr` 為 DER 的 base64url 編碼。
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizeOrderPayload {
    csr: String,
}

impl FinalizeOrderPayload {
    pub fn new(csr_der: &[u8]) -> Self {
        FinalizeOrderPayload {
            csr: base64url(csr_der),
        }
    }
}

impl PayloadT for FinalizeOrderPayload {}

/// key-change 內層 JWS 的載荷：帳戶 URL 與舊金鑰的 JWK。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyChangePayload {
    account: String,
    old_key: Value,
}

impl KeyChangePayload {
    pub fn new(account: impl Into<String>, old_key: Value) -> Self {
        Self {
            account: account.into(),
            old_key,
        }
    }
}

impl PayloadT for KeyChangePayload {}
