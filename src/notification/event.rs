//! 内容变更事件
//!
//! 内容 API 在数据库写入成功后构造一个 `ContentEvent`，交给分发器扇出到各渠道。

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 内容变更动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAction {
    Created,
    Updated,
    Deleted,
}

impl std::str::FromStr for ContentAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "created" | "create" | "new" => Ok(ContentAction::Created),
            "updated" | "update" | "edit" | "edited" => Ok(ContentAction::Updated),
            "deleted" | "delete" | "removed" => Ok(ContentAction::Deleted),
            _ => Err(anyhow!("Unknown content action: {}", s)),
        }
    }
}

/// 内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Code,
    Poetry,
    Image,
    File,
}

impl ContentType {
    /// 通知里展示的类型名
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::File => "文件",
            ContentType::Image => "图片",
            ContentType::Text | ContentType::Code | ContentType::Poetry => "内容",
        }
    }

    /// body 是否为链接（图片和文件存的是 URL）
    pub fn is_link(&self) -> bool {
        matches!(self, ContentType::Image | ContentType::File)
    }
}

impl std::str::FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ContentType::Text),
            "code" => Ok(ContentType::Code),
            "poetry" | "poem" => Ok(ContentType::Poetry),
            "image" | "img" => Ok(ContentType::Image),
            "file" => Ok(ContentType::File),
            _ => Err(anyhow!("Unknown content type: {}", s)),
        }
    }
}

/// 内容变更事件（调用方创建，只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEvent {
    pub action: ContentAction,
    pub content_type: ContentType,
    /// 标题，非空
    pub title: String,
    /// 文本类为原文，图片/文件为 URL
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl ContentEvent {
    /// 创建事件，时间戳取当前时间
    pub fn new(
        action: ContentAction,
        content_type: ContentType,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(anyhow!("title must not be empty"));
        }

        Ok(Self {
            action,
            content_type,
            title,
            body: body.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn created(content_type: ContentType, title: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        Self::new(ContentAction::Created, content_type, title, body)
    }

    pub fn updated(content_type: ContentType, title: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        Self::new(ContentAction::Updated, content_type, title, body)
    }

    /// 删除事件不携带 body
    pub fn deleted(content_type: ContentType, title: impl Into<String>) -> Result<Self> {
        Self::new(ContentAction::Deleted, content_type, title, String::new())
    }

    /// 设置时间戳
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
