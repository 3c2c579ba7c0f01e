use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use openssl::{asn1::Asn1TimeRef, x509::X509};
use thiserror::Error;

/// 證書相關操作可能出現的錯誤類型
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(#[from] openssl::error::ErrorStack),
    #[error("Certificate chain is empty")]
    EmptyChain,
    #[error("Invalid certificate timestamp")]
    InvalidTimestamp,
}

/// 自定義結果型別，錯誤類型為 `CertificateError`
type Result<T> = std::result::Result<T, CertificateError>;

/// X.509 證書封裝結構，提供基本的證書解析與續約檢查功能
#[derive(Clone)]
pub struct Certificate {
    /// 鏈中的第一張（葉）證書
    pub cert: X509,
}

impl Certificate {
    /// 根據 PEM 格式的證書鏈建立實例，只保留第一張證書。
    ///
    /// # 參數
    ///
    /// - `pem`: 伺服器下載的 `application/pem-certificate-chain` 內容
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let cert = X509::stack_from_pem(pem)?
            .into_iter()
            .next()
            .ok_or(CertificateError::EmptyChain)?;
        Ok(Certificate { cert })
    }

    /// 證書的有效期間 `(not_before, not_after)`，皆為 UTC 且包含端點。
    pub fn validity_period(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((
            to_datetime(self.cert.not_before())?,
            to_datetime(self.cert.not_after())?,
        ))
    }

    /// 判斷證書是否應該進行續約
    ///
    /// 剩餘有效時間少於 `threshold_days` 天（或已過期）時回傳 `true`。
    pub fn should_renew(&self, threshold_days: u32) -> Result<bool> {
        self.should_renew_at(threshold_days, Utc::now())
    }

    fn should_renew_at(&self, threshold_days: u32, now: DateTime<Utc>) -> Result<bool> {
        let (_, not_after) = self.validity_period()?;
        let remaining = not_after - now;
        debug!(
            "Certificate expires at {}, {} days remaining",
            not_after,
            remaining.num_days()
        );

        Ok(remaining < TimeDelta::days(i64::from(threshold_days)))
    }
}

fn to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let epoch = openssl::asn1::Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(seconds, 0).ok_or(CertificateError::InvalidTimestamp)
}
