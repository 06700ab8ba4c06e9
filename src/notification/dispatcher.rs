//! 通知分发器 - 管理多个渠道并路由消息
//!
//! 每个渠道一个 tokio 任务，互不影响；调用方只等待一个总时间预算。
//! 预算耗尽时未完成的渠道记为 `Timeout`，后台任务继续跑完并自行记录日志。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::channel::{ChannelKind, ChannelTransport};
use super::credential::{ChannelCredentialCache, TokenProvider};
use super::error::DispatchError;
use super::event::ContentEvent;
use super::formatter::MessageFormatter;
use super::truncator::MessageTruncator;

/// 默认总时间预算
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(10);

/// 预算过大无法表示为时间点时使用的上限
const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    /// 退避基数
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间：`base_delay * 2^(attempt-1)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }
}

/// 单个渠道的分发结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub channel_id: String,
    pub kind: ChannelKind,
    pub delivered: bool,
    pub attempts: u32,
    pub last_error: Option<DispatchError>,
}

struct RegisteredChannel {
    id: String,
    max_length: usize,
    /// UTF-8 字节上限，由渠道类型决定
    max_bytes: Option<usize>,
    transport: Arc<dyn ChannelTransport>,
}

/// 失败后的下一步
enum NextStep {
    RetryNow,
    Backoff,
    Stop,
}

/// 通知分发器 - 管理多个渠道并路由消息
pub struct NotificationDispatcher {
    channels: Vec<Arc<RegisteredChannel>>,
    credentials: Arc<ChannelCredentialCache>,
    policy: RetryPolicy,
    budget: Duration,
    /// 预算耗尽后仍在运行的渠道任务
    background: Mutex<Vec<JoinHandle<DispatchOutcome>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::with_credentials(Arc::new(ChannelCredentialCache::new()))
    }

    /// 使用外部构造的凭证缓存
    pub fn with_credentials(credentials: Arc<ChannelCredentialCache>) -> Self {
        Self {
            channels: Vec::new(),
            credentials,
            policy: RetryPolicy::default(),
            budget: DEFAULT_BUDGET,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 设置调用方最多等待的总时间
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// 注册渠道
    pub fn register_channel(
        &mut self,
        channel_id: impl Into<String>,
        transport: Arc<dyn ChannelTransport>,
        max_length: usize,
    ) {
        let id = channel_id.into();
        let max_bytes = transport.kind().max_bytes();
        info!(channel = %id, kind = %transport.kind(), max_length, ?max_bytes, "Registering notification channel");
        self.channels.push(Arc::new(RegisteredChannel {
            id,
            max_length,
            max_bytes,
            transport,
        }));
    }

    /// 为需要 token 的渠道注册 token 来源
    pub fn register_token_provider(&self, channel_id: impl Into<String>, provider: Arc<dyn TokenProvider>) {
        self.credentials.register(channel_id, provider);
    }

    /// 获取已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 获取已注册的渠道名称
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn credentials(&self) -> &Arc<ChannelCredentialCache> {
        &self.credentials
    }

    /// 渲染每个渠道将要发送的文本，不发送
    pub fn preview(&self, event: &ContentEvent) -> Vec<(String, String)> {
        self.channels
            .iter()
            .map(|c| {
                let formatted = MessageFormatter::format(event, c.transport.kind());
                (
                    c.id.clone(),
                    MessageTruncator::truncate_within(&formatted, c.max_length, c.max_bytes),
                )
            })
            .collect()
    }

    /// 内容变更后的入口
    pub async fn notify(&self, event: &ContentEvent) -> Vec<DispatchOutcome> {
        self.dispatch(event).await
    }

    /// 后台分发，调用方不等待
    pub fn notify_detached(self: &Arc<Self>, event: ContentEvent) -> JoinHandle<Vec<DispatchOutcome>> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.dispatch(&event).await })
    }

    /// 并发发送到所有渠道，每个渠道一个结果，顺序与注册顺序一致
    pub async fn dispatch(&self, event: &ContentEvent) -> Vec<DispatchOutcome> {
        if self.channels.is_empty() {
            debug!("No notification channels configured");
            return Vec::new();
        }

        let deadline = deadline_after(self.budget);
        let event = Arc::new(event.clone());

        let pending: Vec<_> = self
            .channels
            .iter()
            .map(|channel| {
                let attempts = Arc::new(AtomicU32::new(0));
                let handle = tokio::spawn(deliver(
                    Arc::clone(channel),
                    Arc::clone(&event),
                    Arc::clone(&self.credentials),
                    self.policy.clone(),
                    Arc::clone(&attempts),
                ));
                (Arc::clone(channel), attempts, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(pending.len());
        for (channel, attempts, mut handle) in pending {
            let outcome = match timeout_at(deadline, &mut handle).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(channel = %channel.id, error = %e, "Channel task aborted");
                    DispatchOutcome {
                        channel_id: channel.id.clone(),
                        kind: channel.transport.kind(),
                        delivered: false,
                        attempts: attempts.load(Ordering::SeqCst),
                        last_error: Some(DispatchError::Permanent {
                            detail: format!("channel task failed: {}", e),
                        }),
                    }
                }
                Err(_) => {
                    warn!(channel = %channel.id, budget_ms = self.budget.as_millis() as u64, "Dispatch budget exceeded");
                    // 任务继续在后台运行，结果由任务自己记录
                    let mut background = self.lock_background();
                    background.retain(|h| !h.is_finished());
                    background.push(handle);
                    DispatchOutcome {
                        channel_id: channel.id.clone(),
                        kind: channel.transport.kind(),
                        delivered: false,
                        attempts: attempts.load(Ordering::SeqCst),
                        last_error: Some(DispatchError::Timeout),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let delivered = outcomes.iter().filter(|o| o.delivered).count();
        info!(delivered, total = outcomes.len(), action = ?event.action, "Notification dispatched");
        outcomes
    }

    /// 最多等待 `grace`，让预算耗尽后仍在运行的渠道任务跑完
    ///
    /// 返回期间结束的任务数；仍未结束的任务继续在后台运行。
    /// 短生命周期的进程（如 CLI）在退出前调用。
    pub async fn drain_background(&self, grace: Duration) -> usize {
        let handles = std::mem::take(&mut *self.lock_background());
        if handles.is_empty() {
            return 0;
        }

        let deadline = deadline_after(grace);
        let mut finished = 0;
        for mut handle in handles {
            match timeout_at(deadline, &mut handle).await {
                Ok(_) => finished += 1,
                Err(_) => {
                    warn!("Background channel task still running after grace period");
                    self.lock_background().push(handle);
                }
            }
        }
        finished
    }

    fn lock_background(&self) -> MutexGuard<'_, Vec<JoinHandle<DispatchOutcome>>> {
        self.background.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait).unwrap_or(now + MAX_WAIT)
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// 单个渠道的重试状态机
async fn deliver(
    channel: Arc<RegisteredChannel>,
    event: Arc<ContentEvent>,
    credentials: Arc<ChannelCredentialCache>,
    policy: RetryPolicy,
    attempts: Arc<AtomicU32>,
) -> DispatchOutcome {
    let kind = channel.transport.kind();
    let formatted = MessageFormatter::format(&event, kind);
    let text = MessageTruncator::truncate_within(&formatted, channel.max_length, channel.max_bytes);
    let mut last_error = None;

    loop {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let step = match attempt_once(&channel, kind, &text, &credentials).await {
            Ok(()) => {
                info!(channel = %channel.id, attempt, "Notification delivered");
                return DispatchOutcome {
                    channel_id: channel.id.clone(),
                    kind,
                    delivered: true,
                    attempts: attempt,
                    last_error: None,
                };
            }
            Err(err) => {
                let step = match &err {
                    DispatchError::AuthExpired { .. } if credentials.has_provider(&channel.id) => {
                        credentials.invalidate(&channel.id);
                        NextStep::RetryNow
                    }
                    DispatchError::RateLimited { .. } | DispatchError::Transient { .. } => NextStep::Backoff,
                    DispatchError::Credential { error } if error.is_retryable() => NextStep::Backoff,
                    _ => NextStep::Stop,
                };
                warn!(channel = %channel.id, attempt, error = %err, "Notification attempt failed");
                last_error = Some(err);
                step
            }
        };

        if attempt >= policy.max_attempts || matches!(step, NextStep::Stop) {
            break;
        }
        if let NextStep::Backoff = step {
            let delay = policy.backoff(attempt);
            debug!(channel = %channel.id, attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
            tokio::time::sleep(delay).await;
        }
    }

    let attempts = attempts.load(Ordering::SeqCst);
    warn!(channel = %channel.id, attempts, "Notification not delivered");
    DispatchOutcome {
        channel_id: channel.id.clone(),
        kind,
        delivered: false,
        attempts,
        last_error,
    }
}

async fn attempt_once(
    channel: &RegisteredChannel,
    kind: ChannelKind,
    text: &str,
    credentials: &ChannelCredentialCache,
) -> Result<(), DispatchError> {
    let token = if kind.requires_token() {
        Some(credentials.get_token(&channel.id).await?)
    } else {
        None
    };

    match DispatchError::from_transport(channel.transport.send(text, token.as_deref()).await) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}
