//! Board Notify CLI
//!
//! 把内容变更推送到 Telegram、企业微信群机器人和企业微信应用

use anyhow::Result;
use board_notify::cli::{
    handle_channels, handle_preview, handle_send, ChannelsArgs, PreviewArgs, SendArgs,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "board-notify")]
#[command(about = "Board Notify - 内容变更多渠道通知")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送一次内容变更通知
    Send(SendArgs),
    /// 预览各渠道的消息文本，不发送
    Preview(PreviewArgs),
    /// 列出已配置的渠道
    Channels(ChannelsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，例如: RUST_LOG=debug board-notify send ...
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("board_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Send(args) => handle_send(args).await?,
        Commands::Preview(args) => handle_preview(args)?,
        Commands::Channels(args) => handle_channels(args)?,
    }

    Ok(())
}
