//! 此模組提供 JSON Web Signature (JWS) 的建立，以及協定共用的編碼工具：
//! base64url（無填充）、SHA-256 摘要與排序鍵的精簡 JSON。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use openssl::sha::sha256;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    key_pair::{KeyError, KeyPair},
    protection::ProtectedHeader,
};

/// 無填充的 base64url 編碼。
pub fn base64url<T: AsRef<[u8]>>(input: T) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// 計算 SHA-256 摘要並以 base64url 編碼。
pub fn sha256_base64url(input: &[u8]) -> String {
    base64url(sha256(input))
}

/// 以遞迴排序的鍵、無空白的形式序列化 JSON。
///
/// `serde_json` 啟用了 `preserve_order`，物件鍵順序依插入順序，因此需手動排序。
pub fn canonical_json(value: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&sorted(value))
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// 簽名請求的負載。
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// POST-as-GET：負載編碼為空字串，而非 `""` 的 JSON 編碼（`IiI`）。
    Empty,
    /// 一般 JSON 負載。
    Json(Value),
}

impl Payload {
    fn encode(&self) -> serde_json::Result<String> {
        match self {
            Payload::Empty => Ok(String::new()),
            Payload::Json(value) => Ok(base64url(canonical_json(value)?)),
        }
    }
}

/// 表示一個以 flattened JSON 序列化的 JWS 物件，三個欄位皆已 base64url 編碼。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl Jws {
    /// 將 `Jws` 實例序列化為 JSON 格式的字串，作為 HTTP 請求主體。
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// 建立簽名請求。
///
/// 簽名輸入為 `base64url(header) + "." + base64url(payload)` 的 ASCII 位元組，
/// 演算法為 RSASSA-PKCS1-v1_5 / SHA-256。
pub fn sign_jws(header: &ProtectedHeader, payload: &Payload, key: &KeyPair) -> Result<Jws, KeyError> {
    let protected = base64url(canonical_json(&header.to_value(key)?)?);
    let payload = payload.encode()?;
    let signing_input = format!("{}.{}", protected, payload);
    let signature = base64url(key.sign(signing_input.as_bytes())?);

    Ok(Jws {
        protected,
        payload,
        signature,
    })
}
