//! # ACME Resumable Certificate Client
//!
//! 本庫實作 ACME（RFC 8555）客戶端，以可中斷續行的狀態機取得 X.509 憑證。
//! 程序在任何時間點被終止後，重新以相同的狀態儲存執行即可從最後完成的步驟繼續，
//! 不會重複送出挑戰，也不會遺漏驗證資料的清理。
//!
//! - **account**: 帳戶註冊、查詢、更新、金鑰輪替與停用。
//! - **transport**: 目錄快取、nonce 管理與 JWS 簽名請求。
//! - **processor**: 訂單狀態機 `new → authorization → finalization → wait-issuance → download-cert`。
//! - **authenticator**: 由使用者實作的域名驗證資料佈署介面。
//! - **state**: 執行狀態的持久化（檔案或記憶體）。
//!
//! ## 示例
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use acme_resume::{
//!     account::Account,
//!     authenticator::{Authenticator, AuthenticatorError},
//!     challenge::{ChallengeParams, ChallengeType},
//!     config::{AcmeConfig, LETS_ENCRYPT_STAGING_DIRECTORY},
//!     key_pair::KeyPair,
//!     processor::OrderProcessor,
//!     state::FileStateStore,
//! };
//!
//! struct WebRoot;
//!
//! impl Authenticator for WebRoot {
//!     fn setup_domain_validation(
//!         &mut self,
//!         _domain: &str,
//!         offered: &BTreeMap<ChallengeType, ChallengeParams>,
//!     ) -> Result<ChallengeType, AuthenticatorError> {
//!         let params = offered.get(&ChallengeType::Http01).ok_or("http-01 not offered")?;
//!         std::fs::write(format!("/var/www{}", params.http01_path()), &params.key)?;
//!         Ok(ChallengeType::Http01)
//!     }
//!
//!     fn cleanup_domain_validation(
//!         &mut self,
//!         _domain: &str,
//!         _challenge_type: ChallengeType,
//!         params: &ChallengeParams,
//!     ) -> Result<(), AuthenticatorError> {
//!         std::fs::remove_file(format!("/var/www{}", params.http01_path()))?;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AcmeConfig::default().directory_url(LETS_ENCRYPT_STAGING_DIRECTORY);
//!     let mut account = Account::new(config.transport()?, KeyPair::generate(2048)?);
//!     account.create(&["admin@example.com"])?;
//!
//!     let store = FileStateStore::new("state", "example.com", &config.state_suffix);
//!     let mut processor =
//!         OrderProcessor::new(&mut account, &["example.com"], WebRoot, store)?.with_config(&config);
//!     processor.process_order_with_retry()?;
//!
//!     if let (Some(certificate), Some(key)) = (processor.certificate(), processor.private_key()) {
//!         std::fs::write("example.com.crt", certificate)?;
//!         std::fs::write("example.com.key", key)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod authenticator;
pub mod backoff;
pub mod certificate;
pub mod challenge;
pub mod config;
pub mod csr;
pub mod directory;
pub mod domain;
pub mod error;
pub mod http;
pub mod jwk;
pub mod jws;
pub mod key_pair;
pub mod nonce;
pub mod order;
pub mod payload;
pub mod processor;
pub mod protection;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use account::Account;
pub use authenticator::Authenticator;
pub use error::{AcmeError, Result};
pub use order::OrderState;
pub use processor::OrderProcessor;
