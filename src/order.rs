use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::AcmeError, payload::Identifier};

/// 訂單狀態，伺服器回報的值為 pending、ready、processing、valid 與 invalid。
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl FromStr for OrderStatus {
    type Err = AcmeError;

    /// 根據字串內容解析對應的訂單狀態，其他值屬於協定違規。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "processing" => Ok(Self::Processing),
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            _ => Err(AcmeError::ProtocolViolation(format!(
                "bad order status {}",
                s
            ))),
        }
    }
}

/// 伺服器回傳的訂單物件。
///
/// `status` 以原始字串保存，在轉換狀態時才解析，未知值不會在反序列化階段失敗。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderSnapshot {
    /// 訂單當前狀態
    pub status: String,
    /// 證書主題（Domain）識別符
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    /// 授權 URL 列表
    #[serde(default)]
    pub authorizations: Vec<String>,
    /// 最終確認 URL
    pub finalize: String,
    /// 憑證 URL（僅在有效時存在）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// 過期時間（RFC 3339 字串）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl OrderSnapshot {
    pub fn status(&self) -> Result<OrderStatus, AcmeError> {
        self.status.parse()
    }
}

/// 訂單處理的狀態機狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderState {
    New,
    Authorization,
    Finalization,
    WaitIssuance,
    DownloadCert,
    Complete,
    Failed,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// 此狀態的轉換允許產生的下一個狀態；終結狀態沒有後繼。
    pub fn successors(&self) -> &'static [OrderState] {
        use OrderState::*;

        match self {
            New => &[Authorization, Failed, Complete, Finalization, WaitIssuance],
            Authorization => &[Finalization, Authorization, Failed],
            Finalization => &[Failed, Complete, WaitIssuance, DownloadCert],
            WaitIssuance => &[DownloadCert, Failed, Complete, WaitIssuance],
            DownloadCert => &[Complete],
            Complete | Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderState) -> bool {
        self.successors().contains(&next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Authorization => "authorization",
            Self::Finalization => "finalization",
            Self::WaitIssuance => "wait-issuance",
            Self::DownloadCert => "download-cert",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl From<OrderStatus> for OrderState {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => Self::Authorization,
            OrderStatus::Ready => Self::Finalization,
            OrderStatus::Processing => Self::WaitIssuance,
            OrderStatus::Valid => Self::DownloadCert,
            OrderStatus::Invalid => Self::Failed,
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
