use std::{collections::BTreeMap, error::Error};

use crate::challenge::{ChallengeParams, ChallengeType};

/// 驗證器回報的錯誤。
pub type AuthenticatorError = Box<dyn Error + Send + Sync>;

/// 負責在本庫之外佈署與清除域名驗證資料（DNS 記錄、HTTP 檔案等）。
///
/// 每個待處理的授權會呼叫一次 `setup_domain_validation`；該授權進入終結狀態後，
/// 會恰好呼叫一次對應的 `cleanup_domain_validation`，即使中途程序重啟亦同。
pub trait Authenticator {
    /// 佈署驗證資料並回傳實際採用的挑戰類型。
    ///
    /// # 參數
    ///
    /// - `domain`: 以 Unicode 表示的域名，萬用字元授權不含 `*.` 前綴。
    /// - `offered`: 伺服器提供且本庫支援的挑戰類型與參數。
    ///
    /// 回傳的類型必須是 `offered` 中的一個。
    fn setup_domain_validation(
        &mut self,
        domain: &str,
        offered: &BTreeMap<ChallengeType, ChallengeParams>,
    ) -> Result<ChallengeType, AuthenticatorError>;

    /// 移除先前佈署的驗證資料。
    fn cleanup_domain_validation(
        &mut self,
        domain: &str,
        challenge_type: ChallengeType,
        params: &ChallengeParams,
    ) -> Result<(), AuthenticatorError>;
}

impl<A: Authenticator + ?Sized> Authenticator for &mut A {
    fn setup_domain_validation(
        &mut self,
        domain: &str,
        offered: &BTreeMap<ChallengeType, ChallengeParams>,
    ) -> Result<ChallengeType, AuthenticatorError> {
        (**self).setup_domain_validation(domain, offered)
    }

    fn cleanup_domain_validation(
        &mut self,
        domain: &str,
        challenge_type: ChallengeType,
        params: &ChallengeParams,
    ) -> Result<(), AuthenticatorError> {
        (**self).cleanup_domain_validation(domain, challenge_type, params)
    }
}

impl<A: Authenticator + ?Sized> Authenticator for Box<A> {
    fn setup_domain_validation(
        &mut self,
        domain: &str,
        offered: &BTreeMap<ChallengeType, ChallengeParams>,
    ) -> Result<ChallengeType, AuthenticatorError> {
        (**self).setup_domain_validation(domain, offered)
    }

    fn cleanup_domain_validation(
        &mut self,
        domain: &str,
        challenge_type: ChallengeType,
        params: &ChallengeParams,
    ) -> Result<(), AuthenticatorError> {
        (**self).cleanup_domain_validation(domain, challenge_type, params)
    }
}
