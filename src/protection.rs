use serde_json::{Map, Value};

use crate::key_pair::{KeyError, KeyPair};

/// 目前唯一支援的簽章演算法。
pub const ALG_RS256: &str = "RS256";

/// JWS 保護標頭（Protected Header）的建構器。
///
/// 帶有 `kid`（既有帳戶 URL）時不嵌入公鑰；否則在產生時自動嵌入簽名金鑰的 JWK。
/// key-change 的內層 JWS 不帶 nonce，因此 `nonce` 為可選。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedHeader {
    url: String,
    nonce: Option<String>,
    kid: Option<String>,
}

impl ProtectedHeader {
    /// 建立指向 `url` 的保護標頭。
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            nonce: None,
            kid: None,
        }
    }

    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn kid(mut self, kid: Option<&str>) -> Self {
        self.kid = kid.map(str::to_string);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_kid(&self) -> bool {
        self.kid.is_some()
    }

    /// 依簽名金鑰產生完整的標頭 JSON 物件。
    ///
    /// # Errors
    ///
    /// 取得公鑰參數失敗時回傳 [`KeyError`]。
    pub fn to_value(&self, key: &KeyPair) -> Result<Value, KeyError> {
        let mut map = Map::new();
        map.insert("alg".to_string(), Value::String(ALG_RS256.to_string()));
        if let Some(nonce) = &self.nonce {
            map.insert("nonce".to_string(), Value::String(nonce.clone()));
        }
        map.insert("url".to_string(), Value::String(self.url.clone()));
        match &self.kid {
            Some(kid) => {
                map.insert("kid".to_string(), Value::String(kid.clone()));
            }
            None => {
                map.insert("jwk".to_string(), key.jwk()?.to_value()?);
            }
        }
        Ok(Value::Object(map))
    }
}
