//! 本庫統一的錯誤類型。
//!
//! 各模組保有自己的錯誤列舉（[`KeyError`]、[`CsrError`]、[`HttpError`]、[`StateError`]、
//! [`CertificateError`]），
//! 於此匯整為 [`AcmeError`]，並由 [`AcmeError::is_retryable`] 區分「可由呼叫端重試」與
//! 「重試無意義」兩類錯誤。

use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    certificate::CertificateError, csr::CsrError, http::HttpError, http::HttpResponse,
    key_pair::KeyError, state::StateError,
};

/// 帳戶不存在時伺服器回傳的錯誤類型。
pub const ERROR_ACCOUNT_DOES_NOT_EXIST: &str = "urn:ietf:params:acme:error:accountDoesNotExist";
/// nonce 被拒絕時伺服器回傳的錯誤類型。
pub const ERROR_BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";
/// 訂單尚未可 finalize 時伺服器回傳的錯誤類型。
pub const ERROR_ORDER_NOT_READY: &str = "urn:ietf:params:acme:error:orderNotReady";

/// 伺服器回傳的非 2xx 協定錯誤。
///
/// `error_type` 與 `detail` 取自 problem document（RFC 7807），若回應內容無法解析則為空字串。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("ACME server responded {status}: {error_type} {detail}")]
pub struct ProtocolError {
    pub status: u16,
    pub error_type: String,
    pub detail: String,
}

impl ProtocolError {
    /// 由 HTTP 回應建立協定錯誤。
    pub fn from_response(response: &HttpResponse) -> Self {
        let problem: serde_json::Value =
            serde_json::from_slice(&response.body).unwrap_or(serde_json::Value::Null);
        let field = |name: &str| {
            problem
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            status: response.status,
            error_type: field("type"),
            detail: field("detail"),
        }
    }

    pub fn is_account_does_not_exist(&self) -> bool {
        self.error_type == ERROR_ACCOUNT_DOES_NOT_EXIST
    }

    pub fn is_bad_nonce(&self) -> bool {
        self.error_type == ERROR_BAD_NONCE
    }

    pub fn is_order_not_ready(&self) -> bool {
        self.error_type == ERROR_ORDER_NOT_READY
    }
}

/// 所有公開操作可能回傳的錯誤。
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("CSR error: {0}")]
    Csr(#[from] CsrError),
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),
    #[error("Transport error: {0}")]
    Http(#[from] HttpError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("ACME protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Account does not exist")]
    AccountNotFound,
    #[error("State storage error: {0}")]
    Storage(#[from] StateError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Authenticator error: {0}")]
    Authenticator(#[source] Box<dyn StdError + Send + Sync>),
    #[error("Internal error: {0}")]
    Invariant(String),
}

/// 本庫的結果類型。
pub type Result<T> = std::result::Result<T, AcmeError>;

impl AcmeError {
    /// 判斷錯誤是否為暫時性，可由外層重新呼叫 `process_order()` 處理。
    ///
    /// 網路錯誤、狀態檔 I/O、驗證器失敗以及 `badNonce` 屬於暫時性；
    /// 金鑰/CSR 建構錯誤、協定錯誤、無法解析的狀態檔與內部不變量錯誤重試也不會成功。
    pub fn is_retryable(&self) -> bool {
        match self {
            AcmeError::Http(_) | AcmeError::Authenticator(_) => true,
            AcmeError::Storage(e) => matches!(e, StateError::Io(_)),
            AcmeError::Protocol(e) => e.is_bad_nonce(),
            AcmeError::Key(_)
            | AcmeError::Csr(_)
            | AcmeError::Certificate(_)
            | AcmeError::InvalidDomain(_)
            | AcmeError::ProtocolViolation(_)
            | AcmeError::AccountNotFound
            | AcmeError::Json(_)
            | AcmeError::Invariant(_) => false,
        }
    }

    /// 是否為輸入的金鑰、CSR 或域名格式錯誤。
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            AcmeError::Key(_) | AcmeError::Csr(_) | AcmeError::InvalidDomain(_)
        )
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, AcmeError::Invariant(_))
    }
}
