//! 远程翻译限流
//!
//! 两条规则：相邻两次远程翻译的最小间隔，以及 24 小时窗口内的调用上限。
//! 名额在调用前占用，调用失败时归还，因此只有成功的远程翻译才计数。

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::{TranslationError, TranslationResult};

#[derive(Debug)]
struct LimiterState {
    last_call: Option<Instant>,
    window_start: Instant,
    count: u32,
}

/// 远程翻译限流器
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    daily_limit: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, daily_limit: u32) -> Self {
        Self {
            min_interval,
            daily_limit,
            window: constants::RATE_LIMIT_WINDOW,
            state: Mutex::new(LimiterState {
                last_call: None,
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// 按配置构造，未启用时返回 `None`
    pub fn from_config(config: &TranslationConfig) -> Option<Self> {
        config
            .rate_limit_enabled
            .then(|| Self::new(config.rate_limit_interval(), config.daily_translation_limit))
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 申请一次远程翻译的名额
    ///
    /// 名额在锁内立即占用，并发请求不会同时通过检查。返回的许可在
    /// `commit()` 前被丢弃时归还名额，失败的调用不计数。
    pub fn acquire(&self) -> TranslationResult<RatePermit<'_>> {
        let mut state = self.lock();
        let now = Instant::now();

        if now.duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.count = 0;
        }

        if let Some(last) = state.last_call {
            let elapsed = now.duration_since(last);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::warn!("远程翻译过于频繁，需等待 {:?}", wait);
                return Err(TranslationError::RateLimitExceeded(format!(
                    "please wait {:.1}s before the next translation",
                    wait.as_secs_f64()
                )));
            }
        }

        if state.count >= self.daily_limit {
            tracing::warn!("已达到每日远程翻译上限 {}", self.daily_limit);
            return Err(TranslationError::RateLimitExceeded(format!(
                "daily limit of {} translations reached",
                self.daily_limit
            )));
        }

        let permit = RatePermit {
            limiter: self,
            previous_call: state.last_call,
            reserved_at: now,
            window_start: state.window_start,
            committed: false,
        };
        state.last_call = Some(now);
        state.count += 1;
        Ok(permit)
    }

    fn release(&self, permit: &RatePermit<'_>) {
        let mut state = self.lock();
        // 窗口已重置时名额不再占用
        if state.window_start == permit.window_start {
            state.count = state.count.saturating_sub(1);
        }
        // 之后已有其他调用占用时保留其时间
        if state.last_call == Some(permit.reserved_at) {
            state.last_call = permit.previous_call;
        }
    }

    /// 当前窗口内的调用次数
    pub fn used_today(&self) -> u32 {
        self.lock().count
    }
}

/// 已占用的限流名额
#[derive(Debug)]
pub struct RatePermit<'a> {
    limiter: &'a RateLimiter,
    previous_call: Option<Instant>,
    reserved_at: Instant,
    window_start: Instant,
    committed: bool,
}

impl RatePermit<'_> {
    /// 远程翻译成功，保留名额
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limiter.release(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_min_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(5), 100);
        limiter.acquire().unwrap().commit();

        assert!(matches!(
            limiter.acquire(),
            Err(TranslationError::RateLimitExceeded(_))
        ));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_limit_and_reset() {
        let limiter = RateLimiter::new(Duration::ZERO, 2);
        limiter.acquire().unwrap().commit();
        limiter.acquire().unwrap().commit();

        let err = limiter.acquire().unwrap_err();
        assert!(err.to_string().contains("daily limit of 2"));

        tokio::time::advance(constants::RATE_LIMIT_WINDOW).await;
        assert_eq!(limiter.used_today(), 2);
        limiter.acquire().unwrap().commit();
        assert_eq!(limiter.used_today(), 1);
    }

    #[test]
    fn test_outstanding_permit_blocks_others() {
        let limiter = RateLimiter::new(Duration::ZERO, 1);
        let permit = limiter.acquire().unwrap();
        assert_eq!(limiter.used_today(), 1);
        assert!(limiter.acquire().is_err());

        permit.commit();
        assert!(limiter.acquire().is_err());
    }

    #[test]
    fn test_dropped_permit_is_returned() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        {
            let _permit = limiter.acquire().unwrap();
            assert!(limiter.acquire().is_err());
        }

        // 未提交的名额归还，最小间隔也不受影响
        assert_eq!(limiter.used_today(), 0);
        limiter.acquire().unwrap().commit();
        assert_eq!(limiter.used_today(), 1);
    }
}
