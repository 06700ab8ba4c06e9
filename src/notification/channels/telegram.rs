//! Telegram 渠道（Bot API sendMessage，HTML parse_mode）

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::notification::channel::{ChannelKind, ChannelTransport, DeliveryStatus, TransportResult};

/// Telegram Bot API 基础 URL
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram 渠道配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Bot token（静态密钥）
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default)]
    pub disable_web_page_preview: bool,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Telegram 渠道
pub struct TelegramTransport {
    client: Client,
    config: TelegramConfig,
}

impl TelegramTransport {
    pub fn new(client: Client, config: TelegramConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl ChannelTransport for TelegramTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WebhookText
    }

    async fn send(&self, text: &str, _token: Option<&str>) -> TransportResult {
        let request = SendMessageRequest {
            chat_id: &self.config.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: self.config.disable_web_page_preview,
        };

        // URL 中含 bot token，错误信息里去掉 URL
        let response = match self.client.post(self.endpoint()).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                let e = e.without_url();
                warn!(channel = "telegram", error = %e, "Telegram request failed");
                return TransportResult::from_reqwest(&e);
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return TransportResult::from_reqwest(&e.without_url()),
        };

        let result = classify_response(status, &body);
        debug!(channel = "telegram", http_status = status, status = ?result.status, "Telegram response classified");
        result
    }
}

/// 将 Telegram 响应映射为封闭分类
pub fn classify_response(http_status: u16, body: &str) -> TransportResult {
    let response = match serde_json::from_str::<TelegramResponse>(body) {
        Ok(r) => r,
        Err(_) => {
            return TransportResult::failed(
                DeliveryStatus::TransientError,
                format!("unparseable Telegram response (HTTP {})", http_status),
            );
        }
    };

    if response.ok && (200..300).contains(&http_status) {
        return TransportResult::delivered();
    }

    let code = response.error_code.unwrap_or(i64::from(http_status));
    let description = response.description.unwrap_or_else(|| "Unknown error".to_string());
    let mut detail = format!("error_code {}: {}", code, description);

    let status = match code {
        429 => {
            if let Some(retry_after) = response.parameters.and_then(|p| p.retry_after) {
                detail.push_str(&format!(" (retry_after {}s)", retry_after));
            }
            DeliveryStatus::RateLimited
        }
        500..=599 => DeliveryStatus::TransientError,
        _ => DeliveryStatus::PermanentError,
    };

    TransportResult::failed(status, detail)
}
