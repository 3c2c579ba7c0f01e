use std::{collections::BTreeMap, time::Duration};

use reqwest::{
    blocking::{Client, Response},
    header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// 表示在 HTTP 層（連線、逾時、讀取回應）發生的錯誤。
#[derive(Debug, Error)]
pub enum HttpError {
    /// reqwest 回報的請求錯誤。
    #[error("Failed to make request: {0}")]
    Request(#[from] reqwest::Error),
    /// 其他實作回報的連線錯誤。
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// 一次 HTTP 往返的結果，標頭名稱一律為小寫。
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 取得指定標頭，名稱不分大小寫。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// 定義 ACME 協定所需的 HTTP 動作。
///
/// 所有呼叫皆為阻塞式；實作不需支援並行使用。
pub trait HttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;

    fn head(&self, url: &str) -> Result<HttpResponse, HttpError>;

    /// 以 `application/jose+json` 送出已簽名的請求。
    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse, HttpError>;
}

impl<T: HttpClient + ?Sized> HttpClient for &T {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        (**self).get(url)
    }

    fn head(&self, url: &str) -> Result<HttpResponse, HttpError> {
        (**self).head(url)
    }

    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse, HttpError> {
        (**self).post_jose(url, body)
    }
}

/// 以 `reqwest::blocking` 實作的 [`HttpClient`]。
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// 建立帶有指定 User-Agent 與逾時設定的客戶端。
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn convert(response: Response) -> Result<HttpResponse, HttpError> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes()?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        Self::convert(self.client.get(url).send()?)
    }

    fn head(&self, url: &str) -> Result<HttpResponse, HttpError> {
        Self::convert(self.client.head(url).send()?)
    }

    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse, HttpError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/jose+json")
            .body(body)
            .send()?;
        Self::convert(response)
    }
}
