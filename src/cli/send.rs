// src/cli/send.rs
//! Send 命令 - 把一次内容变更推送到所有已配置渠道

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::event_args::{load_config, EventArgs};
use super::output::{format_output, format_outcome};
use crate::notification::NotificationBuilder;

/// 退出前等待超时渠道收尾的时间
const BACKGROUND_GRACE: Duration = Duration::from_secs(5);

/// Send 命令参数
#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub event: EventArgs,

    /// 配置文件路径（默认 ~/.config/board-notify/config.json，不存在则读环境变量）
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 send 命令
///
/// 通知失败只打印，不影响退出码。超出预算的渠道在退出前
/// 最多再等待 `BACKGROUND_GRACE`。
pub async fn handle_send(args: SendArgs) -> Result<()> {
    let event = args.event.to_event()?;
    let config = load_config(args.config.as_ref())?;
    let dispatcher = NotificationBuilder::new(config).build()?;

    if dispatcher.channel_count() == 0 {
        eprintln!("没有可用的通知渠道，请检查配置");
        return Ok(());
    }

    info!(channels = ?dispatcher.channel_names(), "Sending notification");
    let outcomes = dispatcher.notify(&event).await;

    if args.json {
        println!("{}", format_output(&outcomes));
    } else {
        for outcome in &outcomes {
            println!("{}", format_outcome(outcome));
        }
    }

    // runtime 退出会取消仍在重试的渠道任务
    let finished = dispatcher.drain_background(BACKGROUND_GRACE).await;
    if finished > 0 {
        info!(finished, "Timed-out channels finished after the budget");
    }
    Ok(())
}
