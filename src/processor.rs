//! 可中斷續行的訂單處理狀態機。
//!
//! [`OrderProcessor::process_order`] 反覆執行目前狀態對應的轉換，檢查結果是否為允許的後繼狀態，
//! 並在每次轉換後保存 [`RunState`]。程序在任何時間點中斷後，以相同的 [`StateStore`] 再次呼叫
//! 即可從最後完成的轉換繼續。

use std::collections::BTreeMap;

use log::{debug, error, info, warn};

use crate::{
    account::Account,
    authenticator::Authenticator,
    backoff::{Clock, RateLimit, RetryPolicy, SystemClock},
    challenge::{Authorization, AuthorizationStatus, ChallengeParams, ChallengeType, SentChallenge},
    config::AcmeConfig,
    csr::{field_nid, Csr, CsrBuilder},
    domain::{idna_decode, idna_encode},
    error::{AcmeError, Result},
    http::{HttpClient, HttpResponse},
    key_pair::KeyPair,
    order::{OrderSnapshot, OrderState, OrderStatus},
    payload::{ChallengeValidationPayload, FinalizeOrderPayload, NewOrderPayload, PayloadT},
    state::{RunState, StateError, StateStore},
};

/// 授權輪詢的速率限制名稱。
pub const AUTHZ_RATE_LIMIT: &str = "authz_rate_limit";
/// 訂單輪詢的速率限制名稱。
pub const ORDER_RATE_LIMIT: &str = "order_rate_limit";

/// 驅動一張憑證從建立訂單到下載完成的狀態機。
///
/// # 範例
///
/// ```no_run
/// # use acme_resume::{account::Account, config::AcmeConfig, key_pair::KeyPair,
/// #     processor::OrderProcessor, state::FileStateStore, authenticator::Authenticator};
/// # fn run<A: Authenticator>(authenticator: A) -> acme_resume::error::Result<()> {
/// let config = AcmeConfig::default();
/// let account_key = KeyPair::from_pem(&std::fs::read("account.pem").unwrap())?;
/// let mut account = Account::new(config.transport()?, account_key);
/// let store = FileStateStore::new("/var/lib/acme", "example.org", &config.state_suffix);
///
/// let mut processor = OrderProcessor::new(&mut account, &["example.org"], authenticator, store)?
///     .with_config(&config);
/// processor.process_order_with_retry()?;
/// if let Some(certificate) = processor.certificate() {
///     std::fs::write("example.org.pem", certificate).unwrap();
/// }
/// # Ok(())
/// # }
/// ```
pub struct OrderProcessor<'a, C: HttpClient, A: Authenticator, S: StateStore> {
    account: &'a mut Account<C>,
    domains: Vec<String>,
    authenticator: A,
    store: S,
    state: RunState,
    private_key: Option<KeyPair>,
    csr: Option<Csr>,
    csr_fields: Vec<(String, String)>,
    clock: Box<dyn Clock>,
    retry_policy: RetryPolicy,
    key_bits: u32,
    max_attempts: u32,
}

impl<'a, C: HttpClient, A: Authenticator, S: StateStore> OrderProcessor<'a, C, A, S> {
    /// 建立處理器。
    ///
    /// # 參數
    ///
    /// - `account`: 已註冊的帳戶。
    /// - `domains`: 憑證涵蓋的域名，第一個為 Common Name 並決定狀態檔名稱。
    /// - `authenticator`: 佈署域名驗證資料的外部元件。
    /// - `store`: 此域名組的狀態儲存。
    ///
    /// # Errors
    ///
    /// 域名清單為空或含有無效域名時回傳 [`AcmeError::InvalidDomain`]。
    pub fn new<D: AsRef<str>>(
        account: &'a mut Account<C>,
        domains: &[D],
        authenticator: A,
        store: S,
    ) -> Result<Self> {
        if domains.is_empty() {
            return Err(AcmeError::InvalidDomain("no domains given".to_string()));
        }
        let domains: Vec<String> = domains.iter().map(|d| d.as_ref().to_string()).collect();
        for domain in &domains {
            idna_encode(domain)?;
        }

        Ok(Self {
            account,
            domains,
            authenticator,
            store,
            state: RunState::default(),
            private_key: None,
            csr: None,
            csr_fields: Vec::new(),
            clock: Box::new(SystemClock),
            retry_policy: RetryPolicy::default(),
            key_bits: KeyPair::DEFAULT_BITS,
            max_attempts: 5,
        })
    }

    /// 使用呼叫端提供的憑證私鑰，而非自動產生。
    pub fn with_private_key(mut self, key: KeyPair) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_private_key_pem(self, pem: &[u8]) -> Result<Self> {
        Ok(self.with_private_key(KeyPair::from_pem(pem)?))
    }

    /// 使用呼叫端提供的 CSR，此時不需要私鑰。
    pub fn with_csr(mut self, csr: Csr) -> Self {
        self.csr = Some(csr);
        self
    }

    pub fn with_csr_pem(self, pem: &[u8]) -> Result<Self> {
        Ok(self.with_csr(Csr::from_pem(pem)?))
    }

    /// 新增自動產生的 CSR 的主體欄位，Common Name 不可覆寫。
    pub fn csr_field(mut self, name: &str, value: &str) -> Result<Self> {
        field_nid(name)?;
        self.csr_fields.push((name.to_string(), value.to_string()));
        Ok(self)
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// 套用設定中的金鑰長度、退避參數與嘗試次數。
    pub fn with_config(self, config: &AcmeConfig) -> Self {
        self.key_bits(config.rsa_key_size)
            .retry_policy(config.retry_policy())
            .max_attempts(config.max_attempts)
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn current_state(&self) -> OrderState {
        self.state.current_state
    }

    /// 簽發的憑證鏈（PEM），僅在處理完成後存在。
    pub fn certificate(&self) -> Option<Vec<u8>> {
        self.state
            .certificate
            .as_ref()
            .filter(|cert| !cert.is_empty())
            .map(|cert| cert.as_bytes().to_vec())
    }

    /// 自動產生的憑證私鑰（PEM）；由呼叫端提供私鑰或 CSR 時為 `None`。
    pub fn private_key(&self) -> Option<Vec<u8>> {
        self.state
            .private_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| key.as_bytes().to_vec())
    }

    /// 執行狀態機直到到達 `complete` 或 `failed`。
    ///
    /// 先前的執行若已到達終結狀態，狀態會被清除並建立新訂單。
    /// 暫時性錯誤會直接回傳，`current_state` 保持不變，可稍後再次呼叫。
    pub fn process_order(&mut self) -> Result<OrderState> {
        let saved = self.store.load().map_err(|e| match e {
            StateError::Json(_) | StateError::UnsupportedVersion(_) => {
                AcmeError::Invariant(format!("unusable saved state: {}", e))
            }
            e => AcmeError::Storage(e),
        })?;
        self.state = match saved {
            Some(state) if state.current_state.is_terminal() => {
                info!(
                    "Previous order for {} ended as {}, starting a new order",
                    self.domains[0], state.current_state
                );
                RunState::default()
            }
            Some(state) => {
                info!("Resuming order for {} at {}", self.domains[0], state.current_state);
                state
            }
            None => RunState::default(),
        };

        while !self.state.current_state.is_terminal() {
            let current = self.state.current_state;
            let next = match current {
                OrderState::New => self.new_order()?,
                OrderState::Authorization => self.authorization()?,
                OrderState::Finalization => self.finalization()?,
                OrderState::WaitIssuance => self.wait_issuance()?,
                OrderState::DownloadCert => self.download_cert()?,
                OrderState::Complete | OrderState::Failed => {
                    return Err(AcmeError::Invariant(format!(
                        "no transition from terminal state {}",
                        current
                    )))
                }
            };
            if !current.can_transition_to(next) {
                return Err(AcmeError::Invariant(format!(
                    "bad transition {} -> {}",
                    current, next
                )));
            }

            info!("Order state {} -> {}", current, next);
            self.state.current_state = next;
            self.store.save(&self.state)?;
        }

        Ok(self.state.current_state)
    }

    /// 以線性退避重複呼叫 [`Self::process_order`]，只重試可重試的錯誤，
    /// 最多嘗試 `max_attempts` 次並回傳最後一個錯誤。
    pub fn process_order_with_retry(&mut self) -> Result<OrderState> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.process_order() {
                Ok(state) => return Ok(state),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt + 1);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {} seconds",
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_secs()
                    );
                    if !delay.is_zero() {
                        self.clock.sleep(delay);
                    }
                }
                Err(e) => {
                    error!("Processing order for {} failed: {}", self.domains[0], e);
                    return Err(e);
                }
            }
        }
    }

    /// 更新指定的速率限制並立即保存，再睡到下次允許的時間。
    fn rate_limit_delay(&mut self, name: &str) -> Result<()> {
        let now = self.clock.now();
        let limit = self
            .state
            .rate_limits
            .entry(name.to_string())
            .or_insert_with(|| RateLimit::new(now));
        let delay = limit.next_delay(&self.retry_policy, now);
        let attempt = limit.attempt;
        self.store.save(&self.state)?;

        if let Some(delay) = delay {
            debug!(
                "{} attempt {}: delay {:.1} seconds",
                name,
                attempt,
                delay.as_secs_f64()
            );
            self.clock.sleep(delay);
        }
        Ok(())
    }

    fn order(&self) -> Result<&OrderSnapshot> {
        self.state
            .order
            .as_ref()
            .ok_or_else(|| AcmeError::Invariant("no order in state".to_string()))
    }

    fn order_url(&self) -> Result<String> {
        self.state
            .order_url
            .clone()
            .ok_or_else(|| AcmeError::Invariant("no order URL in state".to_string()))
    }

    fn fetch_order(&mut self, order_url: &str) -> Result<OrderSnapshot> {
        let response = self.account.post_as_get(order_url)?;
        parse_body(&response, "order")
    }

    fn fetch_authorization(&mut self, authz_url: &str) -> Result<Authorization> {
        let response = self.account.post_as_get(authz_url)?;
        parse_body(&response, "authorization")
    }

    /// new：送出新訂單後立即重新取得訂單。
    ///
    /// 訂單已存在時伺服器會回傳狀態為 ready 的既有訂單，直接 finalize 卻可能得到
    /// orderNotReady，重新取得一次即可避免。
    fn new_order(&mut self) -> Result<OrderState> {
        info!("Creating new order for {}", self.domains.join(", "));
        let payload = NewOrderPayload::new(&self.domains)?.to_payload()?;
        let new_order_url = self.account.directory()?.new_order.clone();
        let response = self.account.post(&new_order_url, &payload)?;
        let order_url = response
            .header("location")
            .map(str::to_string)
            .ok_or_else(|| {
                AcmeError::ProtocolViolation("new order response has no Location header".to_string())
            })?;

        let order = self.fetch_order(&order_url)?;
        let status = order.status()?;
        debug!("Order {} is {}", order_url, order.status);
        self.state.order_url = Some(order_url);
        self.state.order = Some(order);
        Ok(status.into())
    }

    /// authorization：處理訂單中的每個授權。
    fn authorization(&mut self) -> Result<OrderState> {
        let authorizations = self.order()?.authorizations.clone();

        let mut valid = 0;
        let mut invalid = 0;
        for authz_url in &authorizations {
            if self.process_authz(authz_url)? {
                valid += 1;
            } else {
                invalid += 1;
            }
        }

        if valid == authorizations.len() {
            return Ok(OrderState::Finalization);
        }

        let order_url = self.order_url()?;
        let order = self.fetch_order(&order_url)?;
        let status = order.status()?;
        self.state.order = Some(order);

        if invalid == authorizations.len() {
            error!("Authorization failed for {}", self.domains.join(", "));
        } else {
            warn!(
                "{} of {} authorizations valid, order is {:?}",
                valid,
                authorizations.len(),
                status
            );
        }

        Ok(match status {
            OrderStatus::Invalid => OrderState::Failed,
            OrderStatus::Pending => OrderState::Authorization,
            OrderStatus::Ready | OrderStatus::Processing | OrderStatus::Valid => {
                OrderState::Finalization
            }
        })
    }

    /// 輪詢單一授權直到離開 pending，回傳是否為 valid。
    ///
    /// 挑戰只送出一次；驗證資料的清理只執行一次，兩者都在完成後立即保存狀態。
    fn process_authz(&mut self, authz_url: &str) -> Result<bool> {
        loop {
            self.rate_limit_delay(AUTHZ_RATE_LIMIT)?;
            let authz = self.fetch_authorization(authz_url)?;
            let status = authz.status();
            debug!(
                "Authorization {} for {} is {}",
                authz_url, authz.identifier.value, authz.status
            );
            self.state
                .authz_statuses
                .insert(authz_url.to_string(), authz.clone());

            if status == AuthorizationStatus::Pending {
                if !self.state.challenges_sent.contains_key(authz_url) {
                    let sent = self.setup_authz(&authz)?;
                    self.state
                        .challenges_sent
                        .insert(authz_url.to_string(), sent);
                    self.state.authz_need_cleanup.insert(authz_url.to_string());
                    self.store.save(&self.state)?;
                }
                continue;
            }

            let result = status == AuthorizationStatus::Valid;
            if !result {
                warn!(
                    "Authorization for {} ended as {}",
                    authz.identifier.value, authz.status
                );
            }

            if self.state.authz_need_cleanup.contains(authz_url) {
                self.cleanup_authz(authz_url);
                self.state.authz_need_cleanup.remove(authz_url);
                self.store.save(&self.state)?;
            }
            return Ok(result);
        }
    }

    fn setup_authz(&mut self, authz: &Authorization) -> Result<SentChallenge> {
        let thumbprint = self.account.thumbprint()?;
        let offered = authz.offered_challenges(&thumbprint);
        let params: BTreeMap<ChallengeType, ChallengeParams> = offered
            .iter()
            .map(|(challenge_type, (params, _))| (*challenge_type, params.clone()))
            .collect();

        let domain = idna_decode(&authz.identifier.value)?;
        let chosen = self
            .authenticator
            .setup_domain_validation(&domain, &params)
            .map_err(AcmeError::Authenticator)?;
        let (params, url) = offered.get(&chosen).ok_or_else(|| {
            AcmeError::Authenticator(
                format!("{} validation was not offered for {}", chosen, domain).into(),
            )
        })?;

        info!("Sending {} challenge for {}", chosen, domain);
        self.account
            .post(url, &ChallengeValidationPayload::default().to_payload()?)?;

        Ok(SentChallenge {
            url: url.clone(),
            type_: chosen,
            params: params.clone(),
        })
    }

    /// 清理失敗只記錄，不影響訂單處理。
    fn cleanup_authz(&mut self, authz_url: &str) {
        let Some(sent) = self.state.challenges_sent.get(authz_url).cloned() else {
            return;
        };
        let Some(authz) = self.state.authz_statuses.get(authz_url) else {
            return;
        };

        let result = idna_decode(&authz.identifier.value).and_then(|domain| {
            debug!("Cleaning up {} validation for {}", sent.type_, domain);
            self.authenticator
                .cleanup_domain_validation(&domain, sent.type_, &sent.params)
                .map_err(AcmeError::Authenticator)
        });
        if let Err(e) = result {
            error!("cleanup_domain_validation failed for {}: {}", authz_url, e);
        }
    }

    /// finalization：送出 CSR。
    fn finalization(&mut self) -> Result<OrderState> {
        let csr_der = match &self.csr {
            Some(csr) => csr.to_der()?,
            None => {
                let key = self.certificate_key()?;
                self.build_csr(&key)?.to_der()?
            }
        };

        let finalize_url = self.order()?.finalize.clone();
        info!("Finalizing order at {}", finalize_url);
        let payload = FinalizeOrderPayload::new(&csr_der).to_payload()?;
        let order = match self.account.post(&finalize_url, &payload) {
            Ok(response) => parse_body::<OrderSnapshot>(&response, "order")?,
            Err(AcmeError::Protocol(e)) if e.is_order_not_ready() => {
                warn!("Finalize rejected with orderNotReady, re-fetching order");
                let order_url = self.order_url()?;
                let order = self.fetch_order(&order_url)?;
                let next = OrderState::from(order.status()?);
                if !OrderState::Finalization.can_transition_to(next) {
                    return Err(AcmeError::Protocol(e));
                }
                order
            }
            Err(e) => return Err(e),
        };

        let status = order.status()?;
        self.state.order = Some(order);
        Ok(status.into())
    }

    /// 呼叫端提供的私鑰、先前保存的私鑰，或產生新私鑰並立即保存。
    fn certificate_key(&mut self) -> Result<KeyPair> {
        if let Some(key) = &self.private_key {
            return Ok(key.clone());
        }
        if let Some(pem) = &self.state.private_key {
            return Ok(KeyPair::from_pem(pem.as_bytes())?);
        }

        info!("Generating {}-bit certificate key", self.key_bits);
        let key = KeyPair::generate(self.key_bits)?;
        let pem = String::from_utf8(key.to_pem()?)
            .map_err(|e| AcmeError::Invariant(format!("private key PEM is not UTF-8: {}", e)))?;
        self.state.private_key = Some(pem);
        self.store.save(&self.state)?;
        Ok(key)
    }

    fn build_csr(&self, key: &KeyPair) -> Result<Csr> {
        let domains = self
            .domains
            .iter()
            .map(|domain| idna_encode(domain))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = CsrBuilder::new(&domains)?;
        for (name, value) in &self.csr_fields {
            builder = builder.field(name, value)?;
        }
        Ok(builder.build(key)?)
    }

    /// wait-issuance：輪詢訂單。
    fn wait_issuance(&mut self) -> Result<OrderState> {
        self.rate_limit_delay(ORDER_RATE_LIMIT)?;
        let order_url = self.order_url()?;
        let order = self.fetch_order(&order_url)?;
        let status = order.status()?;
        debug!("Order {} is {}", order_url, order.status);
        self.state.order = Some(order);
        Ok(status.into())
    }

    /// download-cert：下載並保存憑證。
    fn download_cert(&mut self) -> Result<OrderState> {
        let certificate_url = self.order()?.certificate.clone().ok_or_else(|| {
            AcmeError::ProtocolViolation("valid order has no certificate URL".to_string())
        })?;
        info!("Downloading certificate from {}", certificate_url);

        let response = self.account.post_as_get(&certificate_url)?;
        let certificate = String::from_utf8(response.body).map_err(|e| {
            AcmeError::ProtocolViolation(format!("certificate is not valid text: {}", e))
        })?;
        self.state.certificate = Some(certificate);
        Ok(OrderState::Complete)
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
    response
        .json()
        .map_err(|e| AcmeError::ProtocolViolation(format!("malformed {} object: {}", what, e)))
}
