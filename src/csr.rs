use std::result;

use openssl::{
    hash::MessageDigest,
    nid::Nid,
    stack::Stack,
    x509::{extension::SubjectAlternativeName, X509NameBuilder, X509Req},
};
use thiserror::Error;

use crate::key_pair::KeyPair;

/// 用於描述建立 CSR（證書簽名請求）過程中可能發生的錯誤，皆屬建構錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("Openssl error: {0}")]
    OpensslError(#[from] openssl::error::ErrorStack),
    #[error("No domains given")]
    NoDomains,
    #[error("Common name is derived from the first domain and cannot be overridden")]
    CommonNameOverride,
    #[error("Bad CSR field name {0}")]
    UnknownField(String),
}

/// 為簡化錯誤處理定義 Result 類型
type Result<T> = result::Result<T, CsrError>;

/// 將欄位名稱正規化為大寫並以底線分隔，例如 `organization name` 成為 `ORGANIZATION_NAME`。
fn normalize_field_name(name: &str) -> String {
    name.split([' ', '_'])
        .filter(|part| !part.is_empty())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// 取得主體欄位名稱對應的 NID。
///
/// # 錯誤
///
/// `common name` 回傳 [`CsrError::CommonNameOverride`]，未知名稱回傳 [`CsrError::UnknownField`]。
pub fn field_nid(name: &str) -> Result<Nid> {
    let normalized = normalize_field_name(name);
    let nid = match normalized.as_str() {
        "COMMON_NAME" => return Err(CsrError::CommonNameOverride),
        "COUNTRY_NAME" => Nid::COUNTRYNAME,
        "STATE_OR_PROVINCE_NAME" => Nid::STATEORPROVINCENAME,
        "LOCALITY_NAME" => Nid::LOCALITYNAME,
        "STREET_ADDRESS" => Nid::STREETADDRESS,
        "POSTAL_CODE" => Nid::POSTALCODE,
        "ORGANIZATION_NAME" => Nid::ORGANIZATIONNAME,
        "ORGANIZATIONAL_UNIT_NAME" => Nid::ORGANIZATIONALUNITNAME,
        "SERIAL_NUMBER" => Nid::SERIALNUMBER,
        "SURNAME" => Nid::SURNAME,
        "GIVEN_NAME" => Nid::GIVENNAME,
        "TITLE" => Nid::TITLE,
        "PSEUDONYM" => Nid::PSEUDONYM,
        "DOMAIN_COMPONENT" => Nid::DOMAINCOMPONENT,
        "EMAIL_ADDRESS" => Nid::PKCS9_EMAILADDRESS,
        _ => return Err(CsrError::UnknownField(normalized)),
    };
    Ok(nid)
}

/// 已簽署的證書簽名請求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Csr {
    der: Vec<u8>,
}

impl Csr {
    /// 讀取使用者提供的 PEM 格式 CSR。
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        Ok(Self {
            der: X509Req::from_pem(pem)?.to_der()?,
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.der.clone())
    }

    pub fn to_pem(&self) -> Result<Vec<u8>> {
        Ok(X509Req::from_der(&self.der)?.to_pem()?)
    }
}

/// CSR 建構器。
///
/// 第一個域名作為 Common Name；域名超過一個時加入列出全部域名的主體替代名稱 (SAN) 擴展。
/// 域名需已是 ASCII（IDNA）形式。
///
/// # 範例
///
/// ```
/// # use acme_resume::{csr::CsrBuilder, key_pair::KeyPair};
/// let key_pair = KeyPair::generate(2048).unwrap();
/// let csr = CsrBuilder::new(&["example.org", "www.example.org"])
///     .unwrap()
///     .field("organization name", "Example")
///     .unwrap()
///     .build(&key_pair)
///     .unwrap();
/// assert!(!csr.to_der().unwrap().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    domains: Vec<String>,
    fields: Vec<(String, String)>,
}

impl CsrBuilder {
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Result<Self> {
        if domains.is_empty() {
            return Err(CsrError::NoDomains);
        }
        Ok(Self {
            domains: domains.iter().map(|d| d.as_ref().to_string()).collect(),
            fields: Vec::new(),
        })
    }

    /// 新增一個主體欄位，例如 `("organization name", "Example Inc.")`。
    pub fn field(mut self, name: &str, value: &str) -> Result<Self> {
        field_nid(name)?;
        self.fields.push((name.to_string(), value.to_string()));
        Ok(self)
    }

    /// 以指定的金鑰對簽署 CSR，摘要演算法為 SHA-256。
    pub fn build(self, key_pair: &KeyPair) -> Result<Csr> {
        let mut req_builder = X509Req::builder()?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, &self.domains[0])?;
        for (field, value) in &self.fields {
            name.append_entry_by_nid(field_nid(field)?, value)?;
        }
        req_builder.set_subject_name(&name.build())?;

        if self.domains.len() > 1 {
            let mut san_builder = SubjectAlternativeName::new();
            for domain in &self.domains {
                san_builder.dns(domain);
            }
            let san_extension = san_builder.build(&req_builder.x509v3_context(None))?;

            let mut stack = Stack::new()?;
            stack.push(san_extension)?;
            req_builder.add_extensions(&stack)?;
        }

        req_builder.set_pubkey(key_pair.pkey())?;
        req_builder.sign(key_pair.pkey(), MessageDigest::sha256())?;

        Ok(Csr {
            der: req_builder.build().to_der()?,
        })
    }
}
