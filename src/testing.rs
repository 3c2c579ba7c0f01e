//! 測試用的模擬 ACME 伺服器、驗證器、時鐘與狀態紀錄。

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
    time::Duration,
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use openssl::{bn::BigNum, error::ErrorStack, hash::MessageDigest, pkey::PKey, rsa::Rsa, sign::Verifier};
use serde_json::{json, Value};

use crate::{
    authenticator::{Authenticator, AuthenticatorError},
    backoff::Clock,
    challenge::{ChallengeParams, ChallengeType},
    http::{HttpClient, HttpError, HttpResponse},
    order::OrderState,
    state::{MemStateStore, RunState, StateError, StateStore},
};

const BASE: &str = "https://acme.test";
pub(crate) const DIRECTORY_URL: &str = "https://acme.test/directory";
const ACCOUNT_URL: &str = "https://acme.test/acct/1";
const CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\nMIIBfakeleaf\n-----END CERTIFICATE-----\n\
-----BEGIN CERTIFICATE-----\nMIIBfakeissuer\n-----END CERTIFICATE-----\n";

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn endpoint(path: &str) -> String {
    format!("{}/{}", BASE, path)
}

/// 模擬伺服器的行為設定。
#[derive(Debug, Clone)]
pub(crate) struct Scenario {
    /// 依識別符順序的授權結果，未列出者為 valid。
    pub authz_outcomes: Vec<&'static str>,
    pub offered: Vec<&'static str>,
    /// 送出挑戰後授權仍回報 pending 的次數。
    pub pending_polls: usize,
    /// finalize 回應中的訂單狀態：valid 或 processing。
    pub finalize_status: &'static str,
    /// finalize 之後訂單回報 processing 的輪詢次數。
    pub processing_polls: usize,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            authz_outcomes: Vec::new(),
            offered: vec!["http-01", "dns-01", "tls-alpn-01"],
            pending_polls: 0,
            finalize_status: "valid",
            processing_polls: 0,
        }
    }
}

/// 通過驗證、已被處理的請求。
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: String,
    pub nonce: String,
    pub kid: Option<String>,
    /// POST-as-GET 為 `Value::Null`。
    pub payload: Value,
    pub returned_nonce: Option<String>,
}

#[derive(Debug)]
struct FakeAccount {
    jwk: Value,
    contact: Vec<String>,
    status: &'static str,
}

#[derive(Debug)]
struct FakeAuthz {
    value: String,
    wildcard: bool,
    outcome: &'static str,
    triggered: bool,
    pending_left: usize,
}

impl FakeAuthz {
    fn resolved(&self) -> Option<&'static str> {
        (self.triggered && self.pending_left == 0).then_some(self.outcome)
    }
}

#[derive(Debug)]
struct FakeOrder {
    identifiers: Vec<Value>,
    authzs: Vec<FakeAuthz>,
    finalized: bool,
    processing_left: usize,
}

impl FakeOrder {
    fn status(&self) -> &'static str {
        if self.finalized {
            return if self.processing_left > 0 {
                "processing"
            } else {
                "valid"
            };
        }
        let outcomes: Vec<_> = self.authzs.iter().map(FakeAuthz::resolved).collect();
        if outcomes.iter().any(|o| matches!(o, Some(s) if *s != "valid")) {
            "invalid"
        } else if outcomes.iter().all(|o| *o == Some("valid")) {
            "ready"
        } else {
            "pending"
        }
    }

    fn to_json(&self) -> Value {
        let status = self.status();
        let mut order = json!({
            "status": status,
            "expires": "2030-01-01T00:00:00Z",
            "identifiers": self.identifiers,
            "authorizations": (0..self.authzs.len())
                .map(|i| endpoint(&format!("authz/{}", i)))
                .collect::<Vec<_>>(),
            "finalize": endpoint("order/1/finalize"),
        });
        if status == "valid" {
            order["certificate"] = json!(endpoint("cert/1"));
        }
        order
    }
}

#[derive(Debug, Default)]
struct Server {
    scenario: Scenario,
    nonce_counter: u64,
    live_nonces: BTreeSet<String>,
    heads: usize,
    directories: usize,
    requests: Vec<RecordedRequest>,
    calls: BTreeMap<String, usize>,
    failures: BTreeSet<(String, usize)>,
    lost: BTreeSet<(String, usize)>,
    account: Option<FakeAccount>,
    order: Option<FakeOrder>,
    orders_created: usize,
    challenge_posts: usize,
    finalize_accepted: usize,
    csr: Option<Vec<u8>>,
}

type Reply = Result<HttpResponse, HttpResponse>;

fn response(status: u16, body: &Value) -> HttpResponse {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    HttpResponse {
        status,
        headers,
        body: body.to_string().into_bytes(),
    }
}

fn problem(status: u16, kind: &str, detail: &str) -> HttpResponse {
    let mut reply = response(
        status,
        &json!({"type": format!("urn:ietf:params:acme:error:{}", kind), "detail": detail}),
    );
    reply.headers.insert(
        "content-type".to_string(),
        "application/problem+json".to_string(),
    );
    reply
}

fn with_location(mut reply: HttpResponse, location: &str) -> HttpResponse {
    reply
        .headers
        .insert("location".to_string(), location.to_string());
    reply
}

fn decode_json(encoded: &str) -> Result<Value, HttpResponse> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| problem(400, "malformed", "bad base64url JSON"))
}

fn field<'v>(value: &'v Value, name: &str) -> Result<&'v str, HttpResponse> {
    value[name]
        .as_str()
        .ok_or_else(|| problem(400, "malformed", &format!("missing {}", name)))
}

fn verify(jwk: &Value, protected: &str, payload: &str, signature: &str) -> bool {
    let decode = |s: Option<&str>| s.and_then(|s| URL_SAFE_NO_PAD.decode(s).ok());
    let (Some(n), Some(e), Some(sig)) = (
        decode(jwk["n"].as_str()),
        decode(jwk["e"].as_str()),
        decode(Some(signature)),
    ) else {
        return false;
    };

    let check = || -> Result<bool, ErrorStack> {
        let rsa = Rsa::from_public_components(BigNum::from_slice(&n)?, BigNum::from_slice(&e)?)?;
        let pkey = PKey::from_rsa(rsa)?;
        let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)?;
        verifier.update(format!("{}.{}", protected, payload).as_bytes())?;
        verifier.verify(&sig)
    };
    check().unwrap_or(false)
}

impl Server {
    fn issue_nonce(&mut self) -> String {
        self.nonce_counter += 1;
        let nonce = format!("nonce-{}", self.nonce_counter);
        self.live_nonces.insert(nonce.clone());
        nonce
    }

    fn handle(&mut self, url: &str, body: &str) -> Reply {
        let jws: Value =
            serde_json::from_str(body).map_err(|_| problem(400, "malformed", "not a JWS"))?;
        let protected_b64 = field(&jws, "protected")?;
        let payload_b64 = field(&jws, "payload")?;
        let signature_b64 = field(&jws, "signature")?;

        let protected = decode_json(protected_b64)?;
        if protected["alg"] != "RS256" {
            return Err(problem(400, "badSignatureAlgorithm", "expected RS256"));
        }
        if protected["url"] != url {
            return Err(problem(401, "unauthorized", "url mismatch"));
        }
        let nonce = field(&protected, "nonce")
            .map_err(|_| problem(400, "badNonce", "missing nonce"))?
            .to_string();
        if !self.live_nonces.remove(&nonce) {
            return Err(problem(400, "badNonce", "nonce reused or unknown"));
        }

        let kid = protected["kid"].as_str().map(str::to_string);
        let jwk = match (&kid, protected.get("jwk")) {
            (Some(kid), None) => match &self.account {
                Some(account) if kid == ACCOUNT_URL && account.status == "valid" => {
                    account.jwk.clone()
                }
                _ => return Err(problem(401, "unauthorized", "unknown or inactive account")),
            },
            (None, Some(jwk)) => jwk.clone(),
            _ => return Err(problem(400, "malformed", "exactly one of kid and jwk required")),
        };
        if !verify(&jwk, protected_b64, payload_b64, signature_b64) {
            return Err(problem(400, "malformed", "signature verification failed"));
        }

        let payload = if payload_b64.is_empty() {
            Value::Null
        } else {
            decode_json(payload_b64)?
        };
        self.requests.push(RecordedRequest {
            url: url.to_string(),
            nonce,
            kid: kid.clone(),
            payload: payload.clone(),
            returned_nonce: None,
        });

        let path = url.strip_prefix(BASE).unwrap_or(url).trim_start_matches('/');
        let segments: Vec<&str> = path.split('/').collect();
        if segments == ["new-acct"] {
            return match kid {
                None => self.new_account(jwk, &payload),
                Some(_) => Err(problem(400, "malformed", "newAccount requires jwk")),
            };
        }
        if kid.is_none() {
            return Err(problem(400, "malformed", "kid required"));
        }

        match segments.as_slice() {
            ["acct", "1"] => self.update_account(&payload),
            ["key-change"] => self.key_change(&payload),
            ["new-order"] => self.new_order(&payload),
            ["order", "1"] => self.get_order(),
            ["order", "1", "finalize"] => self.finalize(&payload),
            ["authz", index] => self.get_authz(index),
            ["chall", index, challenge_type] => self.post_challenge(index, challenge_type, &payload),
            ["cert", "1"] => self.get_certificate(),
            _ => Err(problem(404, "malformed", "not found")),
        }
    }

    fn account_json(&self) -> Value {
        match &self.account {
            Some(account) => json!({"status": account.status, "contact": account.contact}),
            None => Value::Null,
        }
    }

    fn new_account(&mut self, jwk: Value, payload: &Value) -> Reply {
        if let Some(account) = &self.account {
            if account.jwk == jwk {
                if account.status != "valid" {
                    return Err(problem(403, "unauthorized", "account is deactivated"));
                }
                return Ok(with_location(response(200, &self.account_json()), ACCOUNT_URL));
            }
        }
        if payload["onlyReturnExisting"] == true {
            return Err(problem(400, "accountDoesNotExist", "no account for this key"));
        }

        let contact = payload["contact"]
            .as_array()
            .map(|contacts| {
                contacts
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        self.account = Some(FakeAccount {
            jwk,
            contact,
            status: "valid",
        });
        Ok(with_location(response(201, &self.account_json()), ACCOUNT_URL))
    }

    fn update_account(&mut self, payload: &Value) -> Reply {
        let Some(account) = self.account.as_mut() else {
            return Err(problem(401, "unauthorized", "no account"));
        };
        if payload["status"] == "deactivated" {
            account.status = "deactivated";
        }
        if let Some(contacts) = payload["contact"].as_array() {
            account.contact = contacts
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect();
        }
        Ok(response(200, &self.account_json()))
    }

    fn key_change(&mut self, inner: &Value) -> Reply {
        let protected_b64 = field(inner, "protected")?;
        let payload_b64 = field(inner, "payload")?;
        let signature_b64 = field(inner, "signature")?;
        let protected = decode_json(protected_b64)?;
        if protected.get("nonce").is_some() || protected.get("kid").is_some() {
            return Err(problem(400, "malformed", "inner JWS must not carry nonce or kid"));
        }
        if protected["url"] != endpoint("key-change") {
            return Err(problem(400, "malformed", "inner url mismatch"));
        }
        let new_jwk = protected["jwk"].clone();
        if !verify(&new_jwk, protected_b64, payload_b64, signature_b64) {
            return Err(problem(400, "malformed", "inner signature verification failed"));
        }

        let payload = decode_json(payload_b64)?;
        let Some(account) = self.account.as_mut() else {
            return Err(problem(401, "unauthorized", "no account"));
        };
        if payload["account"] != ACCOUNT_URL || payload["oldKey"] != account.jwk {
            return Err(problem(400, "malformed", "key change payload mismatch"));
        }
        account.jwk = new_jwk;
        Ok(response(200, &json!({})))
    }

    fn new_order(&mut self, payload: &Value) -> Reply {
        let identifiers = payload["identifiers"].as_array().cloned().unwrap_or_default();
        if identifiers.is_empty() {
            return Err(problem(400, "malformed", "no identifiers"));
        }

        let authzs = identifiers
            .iter()
            .enumerate()
            .map(|(i, identifier)| {
                let value = identifier["value"].as_str().unwrap_or_default();
                FakeAuthz {
                    value: value.trim_start_matches("*.").to_string(),
                    wildcard: value.starts_with("*."),
                    outcome: self.scenario.authz_outcomes.get(i).copied().unwrap_or("valid"),
                    triggered: false,
                    pending_left: 0,
                }
            })
            .collect();
        let order = FakeOrder {
            identifiers,
            authzs,
            finalized: false,
            processing_left: 0,
        };
        let body = order.to_json();
        self.order = Some(order);
        self.orders_created += 1;
        Ok(with_location(response(201, &body), &endpoint("order/1")))
    }

    fn order_mut(&mut self) -> Result<&mut FakeOrder, HttpResponse> {
        self.order
            .as_mut()
            .ok_or_else(|| problem(404, "malformed", "no order"))
    }

    fn get_order(&mut self) -> Reply {
        let order = self.order_mut()?;
        let body = order.to_json();
        if order.finalized && order.processing_left > 0 {
            order.processing_left -= 1;
        }
        Ok(response(200, &body))
    }

    fn get_authz(&mut self, index: &str) -> Reply {
        let offered = self.scenario.offered.clone();
        let order = self.order_mut()?;
        let index: usize = index
            .parse()
            .map_err(|_| problem(404, "malformed", "bad authz"))?;
        let authz = order
            .authzs
            .get_mut(index)
            .ok_or_else(|| problem(404, "malformed", "bad authz"))?;

        let status = if !authz.triggered {
            "pending"
        } else if authz.pending_left > 0 {
            authz.pending_left -= 1;
            "pending"
        } else {
            authz.outcome
        };
        let challenges: Vec<Value> = offered
            .iter()
            .map(|t| {
                json!({
                    "type": t,
                    "url": endpoint(&format!("chall/{}/{}", index, t)),
                    "token": format!("token-{}-{}", index, t),
                    "status": if authz.triggered { "processing" } else { "pending" },
                })
            })
            .collect();
        let mut body = json!({
            "identifier": {"type": "dns", "value": authz.value},
            "status": status,
            "expires": "2030-01-01T00:00:00Z",
            "challenges": challenges,
        });
        if authz.wildcard {
            body["wildcard"] = json!(true);
        }
        Ok(response(200, &body))
    }

    fn post_challenge(&mut self, index: &str, challenge_type: &str, payload: &Value) -> Reply {
        if *payload != json!({}) {
            return Err(problem(400, "malformed", "challenge response must be {}"));
        }
        let pending_polls = self.scenario.pending_polls;
        let order = self.order_mut()?;
        let authz = index
            .parse::<usize>()
            .ok()
            .and_then(|i| order.authzs.get_mut(i))
            .ok_or_else(|| problem(404, "malformed", "bad challenge"))?;
        if !authz.triggered {
            authz.triggered = true;
            authz.pending_left = pending_polls;
        }
        self.challenge_posts += 1;
        Ok(response(
            200,
            &json!({
                "type": challenge_type,
                "url": endpoint(&format!("chall/{}/{}", index, challenge_type)),
                "token": format!("token-{}-{}", index, challenge_type),
                "status": "processing",
            }),
        ))
    }

    fn finalize(&mut self, payload: &Value) -> Reply {
        let finalize_status = self.scenario.finalize_status;
        let processing_polls = self.scenario.processing_polls;
        let csr = field(payload, "csr")?.to_string();
        let order = self.order_mut()?;
        if order.status() != "ready" {
            return Err(problem(403, "orderNotReady", "order is not ready"));
        }
        let csr = URL_SAFE_NO_PAD
            .decode(csr)
            .map_err(|_| problem(400, "badCSR", "bad base64url"))?;

        order.finalized = true;
        order.processing_left = if finalize_status == "processing" {
            processing_polls.max(1)
        } else {
            0
        };
        let body = order.to_json();
        self.csr = Some(csr);
        self.finalize_accepted += 1;
        Ok(response(200, &body))
    }

    fn get_certificate(&mut self) -> Reply {
        let order = self.order_mut()?;
        if order.status() != "valid" {
            return Err(problem(404, "malformed", "certificate not issued"));
        }
        let mut reply = response(200, &Value::Null);
        reply.body = CERTIFICATE.as_bytes().to_vec();
        reply.headers.insert(
            "content-type".to_string(),
            "application/pem-certificate-chain".to_string(),
        );
        Ok(reply)
    }
}

/// 在記憶體中執行的 ACME 伺服器。
///
/// 驗證每個請求的 nonce（只接受已發出且未使用的）與 RS256 簽名，
/// 並可在指定 URL 的第 n 次呼叫注入連線錯誤。
#[derive(Debug, Default)]
pub(crate) struct FakeAcme {
    server: RefCell<Server>,
}

impl FakeAcme {
    pub fn new() -> Self {
        Self::with_scenario(Scenario::default())
    }

    pub fn with_scenario(scenario: Scenario) -> Self {
        Self {
            server: RefCell::new(Server {
                scenario,
                ..Server::default()
            }),
        }
    }

    /// 對 `url` 的第 `n` 次 POST 在伺服器處理前以連線錯誤失敗。
    pub fn fail_nth(&self, url: &str, n: usize) {
        self.server
            .borrow_mut()
            .failures
            .insert((url.to_string(), n));
    }

    /// 對 `url` 的第 `n` 次 POST 由伺服器處理，但回應遺失。
    pub fn lose_response_nth(&self, url: &str, n: usize) {
        self.server.borrow_mut().lost.insert((url.to_string(), n));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.server.borrow().requests.clone()
    }

    pub fn head_count(&self) -> usize {
        self.server.borrow().heads
    }

    pub fn directory_count(&self) -> usize {
        self.server.borrow().directories
    }

    pub fn account_contacts(&self) -> Vec<String> {
        self.server
            .borrow()
            .account
            .as_ref()
            .map(|account| account.contact.clone())
            .unwrap_or_default()
    }

    pub fn orders_created(&self) -> usize {
        self.server.borrow().orders_created
    }

    pub fn challenge_posts(&self) -> usize {
        self.server.borrow().challenge_posts
    }

    /// 通過驗證的 finalize 請求數，包含被拒絕者。
    pub fn finalize_posts(&self) -> usize {
        let finalize_url = self.finalize_url();
        self.server
            .borrow()
            .requests
            .iter()
            .filter(|request| request.url == finalize_url)
            .count()
    }

    pub fn finalize_accepted(&self) -> usize {
        self.server.borrow().finalize_accepted
    }

    /// 最後一次被接受的 CSR（DER）。
    pub fn submitted_csr(&self) -> Option<Vec<u8>> {
        self.server.borrow().csr.clone()
    }

    pub fn certificate_body(&self) -> &'static str {
        CERTIFICATE
    }

    pub fn new_order_url(&self) -> String {
        endpoint("new-order")
    }

    pub fn order_url(&self) -> String {
        endpoint("order/1")
    }

    pub fn finalize_url(&self) -> String {
        endpoint("order/1/finalize")
    }

    pub fn authz_url(&self, index: usize) -> String {
        endpoint(&format!("authz/{}", index))
    }
}

impl HttpClient for FakeAcme {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let mut server = self.server.borrow_mut();
        if url != DIRECTORY_URL {
            return Ok(problem(404, "malformed", "not found"));
        }
        server.directories += 1;
        Ok(response(
            200,
            &json!({
                "newNonce": endpoint("new-nonce"),
                "newAccount": endpoint("new-acct"),
                "newOrder": endpoint("new-order"),
                "revokeCert": endpoint("revoke-cert"),
                "keyChange": endpoint("key-change"),
                "meta": {"termsOfService": endpoint("terms")},
            }),
        ))
    }

    fn head(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let mut server = self.server.borrow_mut();
        if url != endpoint("new-nonce") {
            return Ok(problem(404, "malformed", "not found"));
        }
        server.heads += 1;
        let nonce = server.issue_nonce();
        let mut reply = response(200, &Value::Null);
        reply.body.clear();
        reply.headers.insert("replay-nonce".to_string(), nonce);
        Ok(reply)
    }

    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse, HttpError> {
        let mut server = self.server.borrow_mut();
        let count = server.calls.entry(url.to_string()).or_default();
        *count += 1;
        let call = (url.to_string(), *count);
        if server.failures.contains(&call) {
            return Err(HttpError::Connection(format!(
                "injected failure #{} for {}",
                call.1, url
            )));
        }

        let recorded = server.requests.len();
        let mut reply = server.handle(url, &body).unwrap_or_else(|problem| problem);
        let nonce = server.issue_nonce();
        reply
            .headers
            .insert("replay-nonce".to_string(), nonce.clone());
        if server.requests.len() > recorded {
            if let Some(request) = server.requests.last_mut() {
                request.returned_nonce = Some(nonce);
            }
        }

        if server.lost.contains(&call) {
            return Err(HttpError::Connection(format!(
                "response #{} for {} lost",
                call.1, url
            )));
        }
        Ok(reply)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AuthEvent {
    Setup {
        domain: String,
        chosen: ChallengeType,
        key: String,
    },
    Cleanup {
        domain: String,
        challenge_type: ChallengeType,
    },
}

/// 記錄每次呼叫的驗證器；複製出的實例共享紀錄。
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingAuthenticator {
    preferred: Option<ChallengeType>,
    events: Rc<RefCell<Vec<AuthEvent>>>,
}

impl RecordingAuthenticator {
    pub fn preferring(challenge_type: ChallengeType) -> Self {
        Self {
            preferred: Some(challenge_type),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.borrow().clone()
    }

    pub fn setup_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, AuthEvent::Setup { .. }))
            .count()
    }

    pub fn cleanup_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, AuthEvent::Cleanup { .. }))
            .count()
    }

    pub fn chosen(&self) -> Vec<ChallengeType> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuthEvent::Setup { chosen, .. } => Some(chosen),
                AuthEvent::Cleanup { .. } => None,
            })
            .collect()
    }

    /// 每次佈署時選用挑戰的 key authorization。
    pub fn keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuthEvent::Setup { key, .. } => Some(key),
                AuthEvent::Cleanup { .. } => None,
            })
            .collect()
    }
}

impl Authenticator for RecordingAuthenticator {
    fn setup_domain_validation(
        &mut self,
        domain: &str,
        offered: &BTreeMap<ChallengeType, ChallengeParams>,
    ) -> Result<ChallengeType, AuthenticatorError> {
        let chosen = self
            .preferred
            .filter(|preferred| offered.contains_key(preferred))
            .or_else(|| offered.keys().next().copied())
            .ok_or("no supported challenge offered")?;
        let key = offered[&chosen].key.clone();
        self.events.borrow_mut().push(AuthEvent::Setup {
            domain: domain.to_string(),
            chosen,
            key,
        });
        Ok(chosen)
    }

    fn cleanup_domain_validation(
        &mut self,
        domain: &str,
        challenge_type: ChallengeType,
        _params: &ChallengeParams,
    ) -> Result<(), AuthenticatorError> {
        self.events.borrow_mut().push(AuthEvent::Cleanup {
            domain: domain.to_string(),
            challenge_type,
        });
        Ok(())
    }
}

/// 手動推進的時鐘，`sleep` 只記錄並推進時間。
#[derive(Debug, Clone)]
pub(crate) struct ManualClock {
    now: Rc<Cell<f64>>,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(1_000_000.0)),
            sleeps: Rc::default(),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration.as_secs_f64());
        self.sleeps.borrow_mut().push(duration);
    }
}

/// 記錄每次保存時狀態機狀態的儲存。
#[derive(Debug, Clone, Default)]
pub(crate) struct StateLog {
    inner: MemStateStore,
    saved: Rc<RefCell<Vec<OrderState>>>,
}

impl StateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存過的狀態序列，連續重複者只留一個。
    pub fn transitions(&self) -> Vec<OrderState> {
        let mut states = self.saved.borrow().clone();
        states.dedup();
        states
    }
}

impl StateStore for StateLog {
    fn load(&self) -> Result<Option<RunState>, StateError> {
        self.inner.load()
    }

    fn save(&self, state: &RunState) -> Result<(), StateError> {
        self.saved.borrow_mut().push(state.current_state);
        self.inner.save(state)
    }
}
