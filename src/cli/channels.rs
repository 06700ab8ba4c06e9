// src/cli/channels.rs
//! Channels 命令 - 列出配置中的渠道

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::event_args::load_config;
use super::output::format_output;
use crate::config::NotifyConfig;
use crate::notification::ChannelKind;

/// Channels 命令参数
#[derive(Args, Debug)]
pub struct ChannelsArgs {
    /// 配置文件路径
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 单个渠道的摘要（不含密钥）
#[derive(Debug, Serialize, PartialEq)]
pub struct ChannelSummary {
    pub channel_id: String,
    pub kind: ChannelKind,
    pub max_length: usize,
    pub requires_token: bool,
    pub enabled: bool,
}

pub fn summarize(config: &NotifyConfig) -> Vec<ChannelSummary> {
    config
        .channels
        .iter()
        .map(|c| ChannelSummary {
            channel_id: c.channel_id.clone(),
            kind: c.kind(),
            max_length: c.max_length(),
            requires_token: c.kind().requires_token(),
            enabled: c.settings.is_complete(),
        })
        .collect()
}

/// 处理 channels 命令
pub fn handle_channels(args: ChannelsArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let summaries = summarize(&config);

    if args.json {
        println!("{}", format_output(&summaries));
        return Ok(());
    }

    if summaries.is_empty() {
        println!("未配置任何通知渠道");
        return Ok(());
    }

    println!("发现 {} 个通知渠道:\n", summaries.len());
    for s in summaries {
        println!(
            "  {} | 类型: {} | 长度上限: {} | {}",
            s.channel_id,
            s.kind,
            s.max_length,
            if s.enabled { "已启用" } else { "配置不全，已跳过" }
        );
    }
    Ok(())
}
