//! 渠道配置加载
//!
//! 读取优先级：
//! 1. 命令行 `--config` 指定的 JSON 文件
//! 2. `~/.config/board-notify/config.json`
//! 3. 环境变量（`TG_BOT_TOKEN`、`WECOM_CORPID` 等）
//!
//! 配置在进程启动时加载一次，之后只读。缺少必需字段的渠道被跳过，不算错误。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::notification::channel::ChannelKind;
use crate::notification::channels::{TelegramConfig, WecomAppConfig, WecomRobotConfig};
use crate::notification::channels::{telegram, wecom, wecom_app};

/// Telegram 单条消息 4096 字符，留一些余量
pub const DEFAULT_TELEGRAM_MAX_LENGTH: usize = 4000;
/// 群机器人 markdown 内容上限
pub const DEFAULT_ROBOT_MAX_LENGTH: usize = 4096;
/// 应用文本消息上限
pub const DEFAULT_APP_MAX_LENGTH: usize = 2048;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// 渠道专属设置
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelSettings {
    #[serde(rename = "webhook_text")]
    Telegram(TelegramConfig),
    #[serde(rename = "webhook_markdown")]
    WecomRobot(WecomRobotConfig),
    #[serde(rename = "token_api")]
    WecomApp(WecomAppConfig),
}

impl ChannelSettings {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelSettings::Telegram(_) => ChannelKind::WebhookText,
            ChannelSettings::WecomRobot(_) => ChannelKind::WebhookMarkdown,
            ChannelSettings::WecomApp(_) => ChannelKind::TokenApi,
        }
    }

    /// 必需字段是否齐全
    pub fn is_complete(&self) -> bool {
        match self {
            ChannelSettings::Telegram(c) => !c.bot_token.is_empty() && !c.chat_id.is_empty(),
            ChannelSettings::WecomRobot(c) => !c.webhook_url.is_empty(),
            ChannelSettings::WecomApp(c) => !c.corp_id.is_empty() && !c.corp_secret.is_empty(),
        }
    }
}

/// 单个渠道配置
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: String,
    #[serde(flatten)]
    pub settings: ChannelSettings,
    /// 不填则使用渠道类型的默认值
    #[serde(default)]
    pub max_message_length: Option<usize>,
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        self.settings.kind()
    }

    pub fn max_length(&self) -> usize {
        self.max_message_length.unwrap_or(match self.kind() {
            ChannelKind::WebhookText => DEFAULT_TELEGRAM_MAX_LENGTH,
            ChannelKind::WebhookMarkdown => DEFAULT_ROBOT_MAX_LENGTH,
            ChannelKind::TokenApi => DEFAULT_APP_MAX_LENGTH,
        })
    }
}

/// 分发参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// 调用方最多等待的总时间（秒）
    pub budget_secs: u64,
    /// 每个渠道最多尝试次数
    pub max_attempts: u32,
    /// 退避基数（毫秒）
    pub base_delay_ms: u64,
    /// 单次 HTTP 请求超时（秒）
    pub http_timeout_secs: u64,
    /// token 过期安全余量（秒）
    pub token_safety_margin_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            budget_secs: 10,
            max_attempts: 3,
            base_delay_ms: 1000,
            http_timeout_secs: 30,
            token_safety_margin_secs: 60,
        }
    }
}

impl DispatchSettings {
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }
}

/// 通知配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

impl NotifyConfig {
    /// 按优先级自动加载
    pub fn auto_load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        if let Some(path) = Self::default_path() {
            if path.exists() {
                debug!(path = %path.display(), "Using config file");
                return Self::load_file(&path);
            }
        }

        debug!("No config file found, reading environment");
        Self::from_env()
    }

    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/board-notify/config.json"))
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源构建（便于测试）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut channels = Vec::new();

        if let (Some(bot_token), Some(chat_id)) = (get("TG_BOT_TOKEN"), get("TG_CHAT_ID")) {
            channels.push(ChannelConfig {
                channel_id: "telegram".to_string(),
                settings: ChannelSettings::Telegram(TelegramConfig {
                    api_base: get("TG_API_BASE").unwrap_or_else(|| telegram::DEFAULT_API_BASE.to_string()),
                    bot_token,
                    chat_id,
                    disable_web_page_preview: false,
                }),
                max_message_length: parse_opt(&get, "TG_MAX_LENGTH")?,
            });
        } else {
            debug!(channel = "telegram", "Telegram not configured, skipping");
        }

        if let Some(webhook_url) = get("WECOM_WEBHOOK_URL") {
            channels.push(ChannelConfig {
                channel_id: "wecom_robot".to_string(),
                settings: ChannelSettings::WecomRobot(WecomRobotConfig { webhook_url }),
                max_message_length: parse_opt(&get, "WECOM_WEBHOOK_MAX_LENGTH")?,
            });
        } else {
            debug!(channel = "wecom_robot", "WeCom robot not configured, skipping");
        }

        if let (Some(corp_id), Some(corp_secret), Some(agent_id)) =
            (get("WECOM_CORPID"), get("WECOM_CORPSECRET"), get("WECOM_AGENTID"))
        {
            let agent_id = agent_id.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                key: "WECOM_AGENTID".to_string(),
                value: agent_id.clone(),
            })?;
            channels.push(ChannelConfig {
                channel_id: "wecom_app".to_string(),
                settings: ChannelSettings::WecomApp(WecomAppConfig {
                    api_base: get("WECOM_API_BASE").unwrap_or_else(|| wecom::DEFAULT_API_BASE.to_string()),
                    corp_id,
                    corp_secret,
                    agent_id,
                    to_user: get("WECOM_TOUSER").unwrap_or_else(|| wecom_app::DEFAULT_TO_USER.to_string()),
                }),
                max_message_length: parse_opt(&get, "WECOM_MAX_LENGTH")?,
            });
        } else {
            debug!(channel = "wecom_app", "WeCom app not configured, skipping");
        }

        let defaults = DispatchSettings::default();
        let dispatch = DispatchSettings {
            budget_secs: parse_opt(&get, "NOTIFY_BUDGET_SECS")?.unwrap_or(defaults.budget_secs),
            max_attempts: parse_opt(&get, "NOTIFY_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            base_delay_ms: parse_opt(&get, "NOTIFY_BASE_DELAY_MS")?.unwrap_or(defaults.base_delay_ms),
            http_timeout_secs: parse_opt(&get, "NOTIFY_HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout_secs),
            token_safety_margin_secs: defaults.token_safety_margin_secs,
        };

        Ok(Self { channels, dispatch })
    }

    /// 必需字段齐全的渠道
    pub fn usable_channels(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|c| {
            let complete = c.settings.is_complete();
            if !complete {
                debug!(channel = %c.channel_id, "Channel config incomplete, skipping");
            }
            complete
        })
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}
