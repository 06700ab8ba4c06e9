//! 企业微信群机器人渠道（静态 webhook，markdown 消息）

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::wecom::classify_response;
use crate::notification::channel::{ChannelKind, ChannelTransport, TransportResult};

/// 群机器人配置
#[derive(Debug, Clone, Deserialize)]
pub struct WecomRobotConfig {
    /// 完整 webhook 地址（含 key）
    pub webhook_url: String,
}

#[derive(Debug, Serialize)]
struct MarkdownRequest<'a> {
    msgtype: &'static str,
    markdown: MarkdownContent<'a>,
}

#[derive(Debug, Serialize)]
struct MarkdownContent<'a> {
    content: &'a str,
}

/// 群机器人渠道
pub struct WecomRobotTransport {
    client: Client,
    config: WecomRobotConfig,
}

impl WecomRobotTransport {
    pub fn new(client: Client, config: WecomRobotConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChannelTransport for WecomRobotTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WebhookMarkdown
    }

    async fn send(&self, text: &str, _token: Option<&str>) -> TransportResult {
        let request = MarkdownRequest {
            msgtype: "markdown",
            markdown: MarkdownContent { content: text },
        };

        // webhook URL 中的 key 即密钥
        let response = match self.client.post(&self.config.webhook_url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                let e = e.without_url();
                warn!(channel = "wecom_robot", error = %e, "WeCom robot request failed");
                return TransportResult::from_reqwest(&e);
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return TransportResult::from_reqwest(&e.without_url()),
        };

        let result = classify_response(status, &body);
        debug!(channel = "wecom_robot", http_status = status, status = ?result.status, "WeCom robot response classified");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::channel::DeliveryStatus;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_send_markdown() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/cgi-bin/webhook/send")
            .match_query(Matcher::UrlEncoded("key".into(), "robot-key".into()))
            .match_body(Matcher::Json(serde_json::json!({
                "msgtype": "markdown",
                "markdown": { "content": "**新内容上传**" }
            })))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
            .create_async()
            .await;

        let transport = WecomRobotTransport::new(
            Client::new(),
            WecomRobotConfig {
                webhook_url: format!("{}/cgi-bin/webhook/send?key=robot-key", server.url()),
            },
        );

        assert!(transport.send("**新内容上传**", None).await.is_delivered());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_webhook_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/cgi-bin/webhook/send")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"errcode":93000,"errmsg":"invalid webhook url"}"#)
            .create_async()
            .await;

        let transport = WecomRobotTransport::new(
            Client::new(),
            WecomRobotConfig {
                webhook_url: format!("{}/cgi-bin/webhook/send?key=bad", server.url()),
            },
        );

        let result = transport.send("hello", None).await;
        assert_eq!(result.status, DeliveryStatus::PermanentError);
        assert!(result.detail.unwrap().contains("93000"));
    }
}
