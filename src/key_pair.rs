use openssl::{
    error::ErrorStack,
    hash::MessageDigest,
    pkey::{Id, PKey, Private},
    rsa::Rsa,
    sign::Signer,
};
use thiserror::Error;

use crate::jwk::Jwk;
use crate::jws::{canonical_json, sha256_base64url};

/// 金鑰相關操作的錯誤列舉，皆屬於建構錯誤，重試不會成功。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("OpenSSL error: {0}")]
    OpenSSL(#[from] ErrorStack),
    #[error("Unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("Key size too small: {0} bits")]
    KeyTooSmall(u32),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 本模組使用的結果類型，當中錯誤皆為 `KeyError`。
type Result<T> = std::result::Result<T, KeyError>;

/// RSA 金鑰對，用於帳戶簽名或憑證私鑰。
///
/// 內部的 `PKey` 以參考計數共享，`clone` 成本低。
#[derive(Debug, Clone)]
pub struct KeyPair {
    pri_key: PKey<Private>,
}

impl KeyPair {
    /// 預設的 RSA 金鑰長度。
    pub const DEFAULT_BITS: u32 = 4096;
    const MIN_BITS: u32 = 2048;

    /// 產生新的 RSA 金鑰對。
    ///
    /// # 參數
    ///
    /// - `bits`: 模數長度，至少 2048 位元。
    pub fn generate(bits: u32) -> Result<Self> {
        if bits < Self::MIN_BITS {
            return Err(KeyError::KeyTooSmall(bits));
        }
        let rsa = Rsa::generate(bits)?;
        Ok(Self {
            pri_key: PKey::from_rsa(rsa)?,
        })
    }

    /// 根據 PEM 格式的私鑰資料建立金鑰對，僅接受 RSA 金鑰。
    pub fn from_pem(pri_key_pem: &[u8]) -> Result<Self> {
        let pri_key = PKey::private_key_from_pem(pri_key_pem)?;
        match pri_key.id() {
            Id::RSA => Ok(Self { pri_key }),
            _ => Err(KeyError::UnsupportedAlgorithm),
        }
    }

    /// 以傳統 OpenSSL（PKCS#1）PEM 格式輸出私鑰。
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        Ok(self.pri_key.rsa()?.private_key_to_pem()?)
    }

    /// 金鑰的位元長度。
    pub fn bits(&self) -> u32 {
        self.pri_key.bits()
    }

    pub(crate) fn pkey(&self) -> &PKey<Private> {
        &self.pri_key
    }

    /// 取得公鑰的 JWK 表示。
    pub fn jwk(&self) -> Result<Jwk> {
        Jwk::from_key_pair(self)
    }

    /// 計算公鑰縮影（RFC 7638）：排序鍵、無空白的 JWK JSON 經 SHA-256 後以 base64url 編碼。
    pub fn thumbprint(&self) -> Result<String> {
        let jwk = serde_json::to_value(self.jwk()?)?;
        Ok(sha256_base64url(canonical_json(&jwk)?.as_bytes()))
    }

    /// 以 RSASSA-PKCS1-v1_5 / SHA-256 簽署資料。
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.pri_key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }
}
