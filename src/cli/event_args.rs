// src/cli/event_args.rs
//! 事件相关的公共参数

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use crate::config::NotifyConfig;
use crate::notification::{ContentAction, ContentEvent, ContentType};

/// 描述一次内容变更
#[derive(Args, Debug)]
pub struct EventArgs {
    /// 动作: created, updated, deleted
    #[arg(long, short, default_value = "created")]
    pub action: ContentAction,

    /// 内容类型: text, code, poetry, image, file
    #[arg(long = "type", short = 't', default_value = "text")]
    pub content_type: ContentType,

    /// 标题
    #[arg(long)]
    pub title: String,

    /// 正文（图片/文件为 URL）
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// 从文件读取正文
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// 变更时间，RFC 3339（默认当前时间）
    #[arg(long)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventArgs {
    pub fn to_event(&self) -> Result<ContentEvent> {
        let body = match (&self.body, &self.body_file) {
            (Some(body), _) => body.clone(),
            (None, Some(path)) => {
                fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
            }
            (None, None) => String::new(),
        };
        let event = ContentEvent::new(self.action, self.content_type, self.title.clone(), body)?;
        Ok(match self.timestamp {
            Some(timestamp) => event.with_timestamp(timestamp),
            None => event,
        })
    }
}

/// 按 `--config` 或默认位置加载配置
pub fn load_config(path: Option<&PathBuf>) -> Result<NotifyConfig> {
    NotifyConfig::auto_load(path.map(|p| p.as_path())).context("Failed to load notification config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(body: Option<&str>, body_file: Option<PathBuf>) -> EventArgs {
        EventArgs {
            action: ContentAction::Updated,
            content_type: ContentType::Code,
            title: "main.rs".to_string(),
            body: body.map(str::to_string),
            body_file,
            timestamp: None,
        }
    }

    #[test]
    fn test_inline_body() {
        let event = args(Some("fn main() {}"), None).to_event().unwrap();
        assert_eq!(event.action, ContentAction::Updated);
        assert_eq!(event.body, "fn main() {}");
    }

    #[test]
    fn test_body_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from file").unwrap();
        let event = args(None, Some(file.path().to_path_buf())).to_event().unwrap();
        assert_eq!(event.body, "from file");
    }

    #[test]
    fn test_explicit_timestamp() {
        let timestamp: DateTime<Utc> = "2024-03-01T08:30:00Z".parse().unwrap();
        let event = EventArgs {
            timestamp: Some(timestamp),
            ..args(Some("x"), None)
        }
        .to_event()
        .unwrap();
        assert_eq!(event.timestamp, timestamp);
    }

    #[test]
    fn test_missing_body_file() {
        let err = args(None, Some(PathBuf::from("/nonexistent/body.txt"))).to_event().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/body.txt"));
    }
}
