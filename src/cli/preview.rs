// src/cli/preview.rs
//! Preview 命令 - 打印各渠道将要发送的文本，不发送

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use super::event_args::{load_config, EventArgs};
use super::output::format_output;
use crate::notification::NotificationBuilder;

/// Preview 命令参数
#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub event: EventArgs,

    /// 配置文件路径
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 只预览指定渠道
    #[arg(long)]
    pub channel: Option<String>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct PreviewOutput {
    channel_id: String,
    length: usize,
    text: String,
}

/// 处理 preview 命令
pub fn handle_preview(args: PreviewArgs) -> Result<()> {
    let event = args.event.to_event()?;
    let config = load_config(args.config.as_ref())?;
    let dispatcher = NotificationBuilder::new(config).build()?;

    let previews: Vec<PreviewOutput> = dispatcher
        .preview(&event)
        .into_iter()
        .filter(|(id, _)| args.channel.as_deref().map_or(true, |wanted| wanted == id.as_str()))
        .map(|(channel_id, text)| PreviewOutput {
            channel_id,
            length: text.chars().count(),
            text,
        })
        .collect();

    if previews.is_empty() {
        bail!("没有匹配的通知渠道");
    }

    if args.json {
        println!("{}", format_output(&previews));
        return Ok(());
    }

    for preview in previews {
        println!("── {} ({} 字符) ──", preview.channel_id, preview.length);
        println!("{}\n", preview.text);
    }
    Ok(())
}
