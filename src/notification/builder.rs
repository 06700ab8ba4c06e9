//! 通知系统构建器 - 根据配置创建渠道并组装分发器

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use super::channel::ChannelTransport;
use super::channels::{TelegramTransport, WecomAppTransport, WecomRobotTransport, WecomTokenClient};
use super::credential::ChannelCredentialCache;
use super::dispatcher::{NotificationDispatcher, RetryPolicy};
use crate::config::{ChannelSettings, NotifyConfig};

/// 通知系统构建器
pub struct NotificationBuilder {
    config: NotifyConfig,
    client: Option<Client>,
    budget: Option<Duration>,
}

impl NotificationBuilder {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            config,
            client: None,
            budget: None,
        }
    }

    /// 使用外部 HTTP 客户端（默认按配置的超时创建）
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// 覆盖配置中的总时间预算
    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// 构建 NotificationDispatcher，配置不全的渠道被跳过
    pub fn build(self) -> Result<NotificationDispatcher> {
        let settings = &self.config.dispatch;
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(settings.http_timeout())
                .build()
                .context("Failed to build HTTP client")?,
        };

        let credentials =
            Arc::new(ChannelCredentialCache::new().with_safety_margin(settings.token_safety_margin()));
        let mut dispatcher = NotificationDispatcher::with_credentials(Arc::clone(&credentials))
            .with_retry_policy(RetryPolicy {
                max_attempts: settings.max_attempts,
                base_delay: settings.base_delay(),
            })
            .with_budget(self.budget.unwrap_or_else(|| settings.budget()));

        for channel in self.config.usable_channels() {
            let transport: Arc<dyn ChannelTransport> = match &channel.settings {
                ChannelSettings::Telegram(tg) => Arc::new(TelegramTransport::new(client.clone(), tg.clone())),
                ChannelSettings::WecomRobot(robot) => {
                    Arc::new(WecomRobotTransport::new(client.clone(), robot.clone()))
                }
                ChannelSettings::WecomApp(app) => {
                    credentials.register(
                        channel.channel_id.clone(),
                        Arc::new(WecomTokenClient::new(client.clone(), app)),
                    );
                    Arc::new(WecomAppTransport::new(client.clone(), app.clone()))
                }
            };
            dispatcher.register_channel(channel.channel_id.clone(), transport, channel.max_length());
        }

        if dispatcher.channel_count() == 0 {
            info!("No notification channels configured, notifications are disabled");
        }

        Ok(dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, DispatchSettings};
    use crate::notification::channels::{TelegramConfig, WecomAppConfig, WecomRobotConfig};

    fn config() -> NotifyConfig {
        NotifyConfig {
            channels: vec![
                ChannelConfig {
                    channel_id: "tg".to_string(),
                    settings: ChannelSettings::Telegram(TelegramConfig {
                        api_base: "http://127.0.0.1:1".to_string(),
                        bot_token: "t".to_string(),
                        chat_id: "1".to_string(),
                        disable_web_page_preview: false,
                    }),
                    max_message_length: None,
                },
                ChannelConfig {
                    channel_id: "robot".to_string(),
                    settings: ChannelSettings::WecomRobot(WecomRobotConfig {
                        webhook_url: String::new(),
                    }),
                    max_message_length: None,
                },
                ChannelConfig {
                    channel_id: "app".to_string(),
                    settings: ChannelSettings::WecomApp(WecomAppConfig {
                        api_base: "http://127.0.0.1:1".to_string(),
                        corp_id: "c".to_string(),
                        corp_secret: "s".to_string(),
                        agent_id: 1,
                        to_user: "@all".to_string(),
                    }),
                    max_message_length: Some(100),
                },
            ],
            dispatch: DispatchSettings::default(),
        }
    }

    #[test]
    fn test_build_skips_incomplete_channels() {
        let dispatcher = NotificationBuilder::new(config()).build().unwrap();
        assert_eq!(dispatcher.channel_names(), vec!["tg", "app"]);
    }

    #[test]
    fn test_token_channel_gets_provider() {
        let dispatcher = NotificationBuilder::new(config()).build().unwrap();
        assert!(dispatcher.credentials().has_provider("app"));
        assert!(!dispatcher.credentials().has_provider("tg"));
    }

    #[test]
    fn test_empty_config_builds() {
        let dispatcher = NotificationBuilder::new(NotifyConfig::default()).build().unwrap();
        assert_eq!(dispatcher.channel_count(), 0);
    }
}
