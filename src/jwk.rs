use serde::{Deserialize, Serialize};

use crate::{
    jws::base64url,
    key_pair::{KeyError, KeyPair},
};

/// JSON Web Key (JWK) 的封裝，目前僅支援 RSA 格式。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum Jwk {
    /// RSA 格式的 JWK。
    #[serde(rename = "RSA")]
    Rsa(RsaJwk),
}

/// RSA 公鑰參數，`n` 與 `e` 為大端序整數的 base64url 編碼（不含前導零）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaJwk {
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// 根據給定的金鑰對建立對應的 JWK。
    pub fn from_key_pair(key_pair: &KeyPair) -> Result<Self, KeyError> {
        let rsa = key_pair.pkey().rsa()?;

        Ok(Jwk::Rsa(RsaJwk {
            n: base64url(rsa.n().to_vec()),
            e: base64url(rsa.e().to_vec()),
        }))
    }

    /// 轉為 JSON 值，供嵌入保護標頭或 key-change 負載。
    pub fn to_value(&self) -> Result<serde_json::Value, KeyError> {
        Ok(serde_json::to_value(self)?)
    }
}
