//! 通知渠道 trait 定义

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 渠道类型，决定消息格式和线上协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Telegram Bot API，HTML parse_mode
    WebhookText,
    /// 企业微信群机器人，markdown 消息
    WebhookMarkdown,
    /// 企业微信应用消息，需要 access_token
    TokenApi,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::WebhookText => "webhook_text",
            ChannelKind::WebhookMarkdown => "webhook_markdown",
            ChannelKind::TokenApi => "token_api",
        }
    }

    /// 渠道使用的标记语言
    pub fn markup(&self) -> Markup {
        match self {
            ChannelKind::WebhookText => Markup::Html,
            ChannelKind::WebhookMarkdown => Markup::Markdown,
            ChannelKind::TokenApi => Markup::Plain,
        }
    }

    /// 是否需要动态 token
    pub fn requires_token(&self) -> bool {
        matches!(self, ChannelKind::TokenApi)
    }

    /// 内容的 UTF-8 字节上限；企业微信按字节计算长度，Telegram 没有字节限制
    pub fn max_bytes(&self) -> Option<usize> {
        match self {
            ChannelKind::WebhookText => None,
            ChannelKind::WebhookMarkdown => Some(4096),
            ChannelKind::TokenApi => Some(2048),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 标记语言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Html,
    Markdown,
    Plain,
}

/// 发送结果分类（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    AuthExpired,
    RateLimited,
    PermanentError,
    TransientError,
}

/// 单次发送结果
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResult {
    pub status: DeliveryStatus,
    /// 渠道返回的原始错误信息，供日志使用
    pub detail: Option<String>,
}

impl TransportResult {
    pub fn delivered() -> Self {
        Self {
            status: DeliveryStatus::Delivered,
            detail: None,
        }
    }

    pub fn failed(status: DeliveryStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }

    /// 网络层错误（连接失败、超时、读取 body 失败）一律视为暂时性错误
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            "timeout"
        } else if error.is_connect() {
            "connect"
        } else {
            "request"
        };
        Self::failed(DeliveryStatus::TransientError, format!("{} error: {}", kind, error))
    }
}

/// 渠道传输层：构造请求、解析响应信封并分类错误
///
/// 实现方只负责一次 HTTP 交互，重试由分发器负责。
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// 渠道类型
    fn kind(&self) -> ChannelKind;

    /// 发送一条已格式化、已截断的消息
    ///
    /// `token` 仅对 `ChannelKind::TokenApi` 有意义。
    async fn send(&self, text: &str, token: Option<&str>) -> TransportResult;
}
