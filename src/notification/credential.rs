//! 渠道凭证缓存 - 每个渠道一个 access_token，带过期水位
//!
//! 状态机：`Empty -> Refreshing -> Valid -> (过期或 invalidate) -> Empty`
//!
//! 同一渠道并发请求 token 时只发起一次刷新，其余调用方等待同一个刷新结果。
//! 刷新失败时所有等待者拿到同一个错误，状态回到 `Empty`，下一次调用重新刷新。

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::CredentialError;

/// 默认安全余量：距离过期不足 60 秒即视为过期
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// 缓存的 token 最长有效期，超出部分按此截断
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// 认证接口返回的 token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_in: Duration,
}

/// 远端认证接口
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<CachedToken, CredentialError>>>;

enum TokenState {
    Empty,
    Valid(CachedToken),
    Refreshing { generation: u64, future: RefreshFuture },
}

struct Entry {
    provider: Arc<dyn TokenProvider>,
    state: TokenState,
}

/// 渠道凭证缓存
///
/// 条目只能通过 `get_token` / `invalidate` 改变状态。
pub struct ChannelCredentialCache {
    entries: Mutex<HashMap<String, Entry>>,
    safety_margin: Duration,
    generation: AtomicU64,
}

impl ChannelCredentialCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            generation: AtomicU64::new(0),
        }
    }

    /// 设置安全余量
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// 为渠道注册 token 来源，初始状态为 Empty
    pub fn register(&self, channel_id: impl Into<String>, provider: Arc<dyn TokenProvider>) {
        self.lock().insert(
            channel_id.into(),
            Entry {
                provider,
                state: TokenState::Empty,
            },
        );
    }

    pub fn has_provider(&self, channel_id: &str) -> bool {
        self.lock().contains_key(channel_id)
    }

    /// 获取有效 token；必要时刷新（单飞）
    pub async fn get_token(&self, channel_id: &str) -> Result<String, CredentialError> {
        let (generation, future) = {
            let mut entries = self.lock();
            let entry = entries
                .get_mut(channel_id)
                .ok_or_else(|| CredentialError::NotConfigured {
                    channel_id: channel_id.to_string(),
                })?;

            if let TokenState::Valid(token) = &entry.state {
                let fresh = Instant::now()
                    .checked_add(self.safety_margin)
                    .map_or(false, |watermark| watermark < token.expires_at);
                if fresh {
                    return Ok(token.value.clone());
                }
            }

            if let TokenState::Refreshing { generation, future } = &entry.state {
                (*generation, future.clone())
            } else {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let provider = Arc::clone(&entry.provider);
                let refresh = async move {
                    let token = provider.fetch_token().await?;
                    let lifetime = token.expires_in.min(MAX_TOKEN_LIFETIME);
                    let expires_at = Instant::now().checked_add(lifetime).ok_or_else(|| {
                        CredentialError::InvalidResponse {
                            message: format!("token lifetime out of range: {:?}", token.expires_in),
                        }
                    })?;
                    Ok::<_, CredentialError>(CachedToken {
                        value: token.value,
                        expires_at,
                    })
                };
                // provider panic 转为错误，Shared 不会留下中毒的 future
                let future = AssertUnwindSafe(refresh)
                    .catch_unwind()
                    .map(|result| {
                        result.unwrap_or_else(|_| {
                            Err(CredentialError::InvalidResponse {
                                message: "token provider panicked".to_string(),
                            })
                        })
                    })
                    .boxed()
                    .shared();

                debug!(channel = %channel_id, generation, "Refreshing access token");
                entry.state = TokenState::Refreshing {
                    generation,
                    future: future.clone(),
                };
                (generation, future)
            }
        };

        let result = future.await;

        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(channel_id) {
                let current = matches!(
                    entry.state,
                    TokenState::Refreshing { generation: g, .. } if g == generation
                );
                if current {
                    entry.state = match &result {
                        Ok(token) => TokenState::Valid(token.clone()),
                        Err(e) => {
                            warn!(channel = %channel_id, error = %e, "Access token refresh failed");
                            TokenState::Empty
                        }
                    };
                }
            }
        }

        result.map(|token| token.value)
    }

    /// 强制置为 Empty（收到 token 过期响应后调用）
    pub fn invalidate(&self, channel_id: &str) {
        if let Some(entry) = self.lock().get_mut(channel_id) {
            debug!(channel = %channel_id, "Invalidating cached access token");
            entry.state = TokenState::Empty;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ChannelCredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// 计数的 mock token 来源
    struct CountingProvider {
        calls: AtomicUsize,
        fail_first: usize,
        expires_in: Duration,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(expires_in: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                expires_in,
                delay: Duration::from_millis(50),
            }
        }

        fn failing_first(mut self, n: usize) -> Self {
            self.fail_first = n;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if n <= self.fail_first {
                return Err(CredentialError::Transient {
                    message: "connection refused".to_string(),
                });
            }
            Ok(AccessToken {
                value: format!("tok-{}", n),
                expires_in: self.expires_in,
            })
        }
    }

    fn cache_with(provider: Arc<CountingProvider>) -> Arc<ChannelCredentialCache> {
        let cache = ChannelCredentialCache::new();
        cache.register("wecom", provider);
        Arc::new(cache)
    }

    #[tokio::test]
    async fn test_concurrent_get_token_refreshes_once() {
        let provider = Arc::new(CountingProvider::new(Duration::from_secs(7200)));
        let cache = cache_with(provider.clone());

        let calls = (0..10).map(|_| {
            let cache = cache.clone();
            async move { cache.get_token("wecom").await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(provider.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn test_valid_token_served_from_cache() {
        let provider = Arc::new(CountingProvider::new(Duration::from_secs(7200)));
        let cache = cache_with(provider.clone());

        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-1");
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-1");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_within_safety_margin() {
        let provider = Arc::new(CountingProvider::new(Duration::from_secs(120)));
        let cache = cache_with(provider.clone());

        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-1");
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-1");

        // 剩余有效期不足 60 秒
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-2");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let provider = Arc::new(CountingProvider::new(Duration::from_secs(7200)));
        let cache = cache_with(provider.clone());

        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-1");
        cache.invalidate("wecom");
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-2");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_reaches_all_waiters_without_poisoning() {
        let provider = Arc::new(CountingProvider::new(Duration::from_secs(7200)).failing_first(1));
        let cache = cache_with(provider.clone());

        let calls = (0..5).map(|_| {
            let cache = cache.clone();
            async move { cache.get_token("wecom").await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(provider.calls(), 1);
        for result in results {
            assert!(matches!(result, Err(CredentialError::Transient { .. })));
        }

        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-2");
        assert_eq!(provider.calls(), 2);
    }

    /// 第一次调用 panic，之后正常返回
    struct PanicOnceProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for PanicOnceProvider {
        async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("provider bug");
            }
            Ok(AccessToken {
                value: "tok-ok".to_string(),
                expires_in: Duration::from_secs(7200),
            })
        }
    }

    #[tokio::test]
    async fn test_oversized_lifetime_is_clamped() {
        let provider = Arc::new(CountingProvider::new(Duration::from_secs(u64::MAX)));
        let cache = cache_with(provider.clone());

        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-1");
        cache.invalidate("wecom");
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-2");
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-2");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_panic_does_not_poison_entry() {
        let cache = ChannelCredentialCache::new();
        cache.register("wecom", Arc::new(PanicOnceProvider { calls: AtomicUsize::new(0) }));

        let err = cache.get_token("wecom").await.unwrap_err();
        assert!(matches!(err, CredentialError::InvalidResponse { .. }));
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-ok");
    }

    #[tokio::test]
    async fn test_huge_safety_margin_forces_refresh() {
        let provider = Arc::new(CountingProvider::new(Duration::from_secs(7200)));
        let cache = ChannelCredentialCache::new().with_safety_margin(Duration::from_secs(u64::MAX));
        cache.register("wecom", provider.clone());

        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-1");
        assert_eq!(cache.get_token("wecom").await.unwrap(), "tok-2");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let cache = ChannelCredentialCache::new();
        let err = cache.get_token("missing").await.unwrap_err();
        assert_eq!(
            err,
            CredentialError::NotConfigured {
                channel_id: "missing".to_string()
            }
        );
        assert!(!cache.has_provider("missing"));
    }
}
