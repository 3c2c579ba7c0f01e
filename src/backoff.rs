//! 線性退避與可替換的時鐘。
//!
//! 速率限制的計數與時間戳記保存在執行狀態中，程序重啟後退避不會被重設。

use std::{fmt, thread, time::Duration};

use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};

/// 時間來源與睡眠動作的抽象，測試時可替換為手動時鐘。
pub trait Clock: fmt::Debug {
    /// 目前時間，單位為自 Unix 紀元起的秒數。
    fn now(&self) -> f64;

    fn sleep(&self, duration: Duration);
}

/// 使用系統時間與 `thread::sleep` 的時鐘。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }

    fn sleep(&self, duration: Duration) {
        debug!("Delay for {:.1} seconds", duration.as_secs_f64());
        thread::sleep(duration);
    }
}

/// 退避參數。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
        }
    }

    /// 第 `attempt` 次嘗試（從 1 起算）對應的延遲：`min((attempt - 1) * min_delay, max_delay)`。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.min_delay
            .saturating_mul(attempt.saturating_sub(1))
            .min(self.max_delay)
    }
}

/// 單一具名操作的速率限制紀錄。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub attempt: u32,
    pub delay_start: f64,
    #[serde(default)]
    pub delay_end: f64,
}

impl RateLimit {
    pub fn new(now: f64) -> Self {
        Self {
            attempt: 0,
            delay_start: now,
            delay_end: now,
        }
    }

    /// 記錄一次嘗試並計算需要睡眠的時間。
    ///
    /// 延遲的結束時間由上一次的起點加上 [`RetryPolicy::delay_for`] 得出，
    /// 起點隨即更新為 `now`。若剩餘時間為正，回傳的睡眠時間至少一秒。
    pub fn next_delay(&mut self, policy: &RetryPolicy, now: f64) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        self.delay_end = self.delay_start + policy.delay_for(self.attempt).as_secs_f64();
        self.delay_start = now;

        let seconds = self.delay_end - now;
        if seconds > 0.0 {
            Some(Duration::from_secs_f64(seconds.max(1.0)))
        } else {
            None
        }
    }
}
