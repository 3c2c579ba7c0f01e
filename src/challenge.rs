use std::{collections::BTreeMap, fmt, str::FromStr};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    jws::sha256_base64url,
    payload::Identifier,
};

/// 表示 ACME 挑戰的類型，用於選擇相應的驗證方式。
///
/// 排序依字串表示（`dns-01` 在 `http-01` 之前），對應表的迭代順序因此固定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "dns-01")]
    Dns01,
    #[serde(rename = "http-01")]
    Http01,
}

/// 伺服器提供了本庫不支援的挑戰類型。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unsupported challenge type: {0}")]
pub struct UnsupportedChallengeType(pub String);

impl FromStr for ChallengeType {
    type Err = UnsupportedChallengeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http-01" => Ok(Self::Http01),
            "dns-01" => Ok(Self::Dns01),
            _ => Err(UnsupportedChallengeType(s.to_string())),
        }
    }
}

impl ChallengeType {
    /// 返回挑戰類型對應的字串表示。
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http01 => "http-01",
            Self::Dns01 => "dns-01",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 提供給驗證器的單一挑戰參數。
///
/// - `token`: 伺服器給定的挑戰 token。
/// - `key`: key authorization，即 `token + "." + 帳戶金鑰縮影`，http-01 的檔案內容。
/// - `key_digest`: `key` 的 SHA-256 base64url 摘要，dns-01 的 TXT 記錄值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeParams {
    pub token: String,
    pub key: String,
    pub key_digest: String,
}

impl ChallengeParams {
    pub fn new(token: &str, thumbprint: &str) -> Self {
        let key = format!("{}.{}", token, thumbprint);
        let key_digest = sha256_base64url(key.as_bytes());
        Self {
            token: token.to_string(),
            key,
            key_digest,
        }
    }

    /// http-01 驗證檔案相對於網站根目錄的路徑。
    pub fn http01_path(&self) -> String {
        format!("/.well-known/acme-challenge/{}", self.token)
    }
}

/// dns-01 驗證的 TXT 記錄名稱，萬用字元前綴會被移除。
pub fn dns01_record_name(domain: &str) -> String {
    format!("_acme-challenge.{}", domain.trim_start_matches("*."))
}

/// 伺服器回傳的挑戰物件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSnapshot {
    #[serde(rename = "type")]
    pub type_: String,
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// 表示授權的狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

impl AuthorizationStatus {
    /// 根據字串返回對應的狀態，未知值視為 `Invalid`。
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "valid" => Self::Valid,
            "deactivated" => Self::Deactivated,
            "expired" => Self::Expired,
            "revoked" => Self::Revoked,
            _ => Self::Invalid,
        }
    }
}

/// 伺服器回傳的授權物件，原樣保存於執行狀態中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub status: String,
    #[serde(default)]
    pub challenges: Vec<ChallengeSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<bool>,
}

impl Authorization {
    pub fn status(&self) -> AuthorizationStatus {
        AuthorizationStatus::parse(&self.status)
    }

    /// 整理所有支援的挑戰，回傳挑戰類型到參數與挑戰 URL 的對應表。
    ///
    /// 不支援的挑戰類型會被略過。
    pub fn offered_challenges(
        &self,
        thumbprint: &str,
    ) -> BTreeMap<ChallengeType, (ChallengeParams, String)> {
        let mut offered = BTreeMap::new();
        for challenge in &self.challenges {
            match challenge.type_.parse::<ChallengeType>() {
                Ok(challenge_type) => {
                    offered.insert(
                        challenge_type,
                        (
                            ChallengeParams::new(&challenge.token, thumbprint),
                            challenge.url.clone(),
                        ),
                    );
                }
                Err(e) => debug!("Ignoring challenge: {}", e),
            }
        }
        offered
    }
}

/// 已送出的挑戰紀錄，供日後清理驗證資料使用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentChallenge {
    pub url: String,
    #[serde(rename = "type")]
    pub type_: ChallengeType,
    pub params: ChallengeParams,
}
