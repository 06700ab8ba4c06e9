//! 企业微信应用消息渠道
//!
//! 发送前需用 corpid/corpsecret 换取 access_token（有效期通常 7200 秒），
//! token 由 `ChannelCredentialCache` 缓存，这里只负责两次 HTTP 交互。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::wecom::{
    classify_response, DEFAULT_API_BASE, ERRCODE_BUSY, ERRCODE_CONCURRENCY_LIMIT, ERRCODE_FREQ_LIMIT,
};
use crate::notification::channel::{ChannelKind, ChannelTransport, DeliveryStatus, TransportResult};
use crate::notification::credential::{AccessToken, TokenProvider};
use crate::notification::error::CredentialError;

/// 接收人默认值：全部成员
pub const DEFAULT_TO_USER: &str = "@all";

/// token 响应缺少 expires_in 时的默认有效期
const DEFAULT_EXPIRES_IN_SECS: u64 = 7200;
/// expires_in 上限
const MAX_EXPIRES_IN_SECS: u64 = 24 * 60 * 60;

/// 应用消息配置
#[derive(Debug, Clone, Deserialize)]
pub struct WecomAppConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub corp_id: String,
    pub corp_secret: String,
    pub agent_id: i64,
    /// 接收人，`|` 分隔的成员 ID，默认全部成员
    #[serde(default = "default_to_user")]
    pub to_user: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_to_user() -> String {
    DEFAULT_TO_USER.to_string()
}

#[derive(Debug, Serialize)]
struct TextMessageRequest<'a> {
    touser: &'a str,
    msgtype: &'static str,
    agentid: i64,
    text: TextContent<'a>,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// 应用消息渠道
pub struct WecomAppTransport {
    client: Client,
    config: WecomAppConfig,
}

impl WecomAppTransport {
    pub fn new(client: Client, config: WecomAppConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChannelTransport for WecomAppTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::TokenApi
    }

    async fn send(&self, text: &str, token: Option<&str>) -> TransportResult {
        let Some(token) = token else {
            return TransportResult::failed(DeliveryStatus::PermanentError, "missing access token");
        };

        let url = format!("{}/cgi-bin/message/send", self.config.api_base.trim_end_matches('/'));
        let request = TextMessageRequest {
            touser: &self.config.to_user,
            msgtype: "text",
            agentid: self.config.agent_id,
            text: TextContent { content: text },
        };

        let response = match self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let e = e.without_url();
                warn!(channel = "wecom_app", error = %e, "WeCom message request failed");
                return TransportResult::from_reqwest(&e);
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return TransportResult::from_reqwest(&e.without_url()),
        };

        let result = classify_response(status, &body);
        debug!(channel = "wecom_app", http_status = status, status = ?result.status, "WeCom message response classified");
        result
    }
}

/// gettoken 接口客户端
pub struct WecomTokenClient {
    client: Client,
    api_base: String,
    corp_id: String,
    corp_secret: String,
}

impl WecomTokenClient {
    pub fn new(client: Client, config: &WecomAppConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.clone(),
            corp_id: config.corp_id.clone(),
            corp_secret: config.corp_secret.clone(),
        }
    }
}

#[async_trait]
impl TokenProvider for WecomTokenClient {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let url = format!("{}/cgi-bin/gettoken", self.api_base.trim_end_matches('/'));

        // query 中含 corpsecret，错误信息里去掉 URL
        let response = self
            .client
            .get(&url)
            .query(&[("corpid", self.corp_id.as_str()), ("corpsecret", self.corp_secret.as_str())])
            .send()
            .await
            .map_err(|e| CredentialError::Transient {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| CredentialError::Transient {
            message: e.without_url().to_string(),
        })?;

        let token: TokenResponse = match serde_json::from_str(&body) {
            Ok(t) => t,
            Err(e) if status.is_success() => {
                return Err(CredentialError::InvalidResponse {
                    message: format!("failed to parse gettoken response: {}", e),
                });
            }
            Err(_) => {
                return Err(CredentialError::Transient {
                    message: format!("gettoken returned HTTP {}", status.as_u16()),
                });
            }
        };

        match token.errcode {
            0 => {}
            ERRCODE_BUSY | ERRCODE_FREQ_LIMIT | ERRCODE_CONCURRENCY_LIMIT => {
                return Err(CredentialError::Transient {
                    message: format!("errcode {}: {}", token.errcode, token.errmsg),
                });
            }
            code => {
                return Err(CredentialError::Rejected {
                    code,
                    message: token.errmsg,
                });
            }
        }

        let value = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CredentialError::InvalidResponse {
                message: "gettoken response has no access_token".to_string(),
            })?;

        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS).min(MAX_EXPIRES_IN_SECS);
        debug!(channel = "wecom_app", expires_in, "Fetched WeCom access token");

        Ok(AccessToken {
            value,
            expires_in: Duration::from_secs(expires_in),
        })
    }
}
