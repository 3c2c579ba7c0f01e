//! 域名的 IDNA 轉換與狀態檔名稱的推導。

use crate::error::{AcmeError, Result};

const WILDCARD: &str = "*";

/// 將域名逐段轉為 IDNA（punycode）ASCII 形式，萬用字元段 `*` 保持不變。
///
/// # Errors
///
/// 空域名、空標籤或無法轉換的標籤回傳 [`AcmeError::InvalidDomain`]。
pub fn idna_encode(domain: &str) -> Result<String> {
    map_labels(domain, |label| {
        idna::domain_to_ascii(label).map_err(|e| AcmeError::InvalidDomain(format!("{}: {:?}", domain, e)))
    })
}

/// 將 IDNA 形式的域名逐段解碼回 Unicode，萬用字元段 `*` 保持不變。
pub fn idna_decode(domain: &str) -> Result<String> {
    map_labels(domain, |label| {
        let (decoded, result) = idna::domain_to_unicode(label);
        result
            .map(|_| decoded)
            .map_err(|e| AcmeError::InvalidDomain(format!("{}: {:?}", domain, e)))
    })
}

fn map_labels<F>(domain: &str, mut convert: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    if domain.is_empty() {
        return Err(AcmeError::InvalidDomain("empty domain name".to_string()));
    }

    let mut labels = Vec::new();
    for label in domain.split('.') {
        if label.is_empty() {
            return Err(AcmeError::InvalidDomain(format!("{}: empty label", domain)));
        }
        if label == WILDCARD {
            labels.push(WILDCARD.to_string());
        } else {
            labels.push(convert(label)?);
        }
    }
    Ok(labels.join("."))
}

/// 由主要域名推導狀態檔的基本名稱：轉小寫、`*` 換成 `STAR`，
/// 並替換不適合出現在檔名中的字元。
pub fn state_basename(primary_domain: &str) -> String {
    primary_domain
        .to_lowercase()
        .replace('*', "STAR")
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}
