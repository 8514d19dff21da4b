//! 再試行ポリシーと共有レートリミッター
//!
//! 5xx・タイムアウトは指数バックオフで再試行し、429は`Retry-After`を優先する。
//! `RateLimiter`はクライアントの全クローンで共有され、429を受けた時点で
//! 他の呼び出しも指定時刻まで待機させる。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 再試行の設定
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大試行回数（初回を含む）
    pub max_attempts: u32,
    /// 初回の待機時間
    pub initial_delay: Duration,
    /// 待機時間の上限
    pub max_delay: Duration,
    /// バックオフ倍率
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 再試行しない設定
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// テストなどで待機を短くする
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// attempt回目（0始まり）の失敗後の待機時間
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(16)).unwrap_or(16);
        let delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exp);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// 429時の待機時間（Retry-Afterがあればそれを上限付きで採用）
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait.min(self.max_delay),
            None => self.delay_for_attempt(attempt),
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// `Retry-After` ヘッダー（秒数）を解釈
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// 全リクエストで共有する429用の一時停止状態
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    paused_until: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 一時停止中であれば解除時刻まで待機
    pub async fn wait_ready(&self) {
        let until = *self.paused_until.lock().await;
        if let Some(until) = until {
            if until > Instant::now() {
                tokio::time::sleep_until(until).await;
            }
        }
    }

    /// 指定時間だけ全呼び出しを停止（既存の停止より長い場合のみ延長）
    pub async fn pause_for(&self, wait: Duration) {
        let target = Instant::now() + wait;
        let mut guard = self.paused_until.lock().await;
        match *guard {
            Some(current) if current >= target => {}
            _ => *guard = Some(target),
        }
    }

    pub async fn is_paused(&self) -> bool {
        matches!(*self.paused_until.lock().await, Some(until) if until > Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_allows_three_attempts() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn test_delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_rate_limit_delay_prefers_retry_after() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.rate_limit_delay(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(policy.rate_limit_delay(1, None), policy.delay_for_attempt(1));
        assert_eq!(
            policy.rate_limit_delay(0, Some(Duration::from_secs(3600))),
            policy.max_delay
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_rate_limiter_is_shared_between_clones() {
        // Given: クローンしたリミッター
        let limiter = RateLimiter::new();
        let clone = limiter.clone();

        // When: 片方で一時停止
        clone.pause_for(Duration::from_millis(50)).await;

        // Then: もう片方からも停止中に見え、待機後に解除される
        assert!(limiter.is_paused().await);
        limiter.wait_ready().await;
        assert!(!limiter.is_paused().await);
    }

    #[tokio::test]
    async fn test_pause_never_shortens_existing_pause() {
        let limiter = RateLimiter::new();

        limiter.pause_for(Duration::from_secs(60)).await;
        limiter.pause_for(Duration::from_millis(1)).await;

        assert!(limiter.is_paused().await);
    }
}
