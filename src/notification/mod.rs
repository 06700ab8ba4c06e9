//! 通知抽象层 - 内容变更事件扇出到多个渠道
//!
//! # 组成
//! 1. `MessageFormatter`：按渠道标记语言渲染事件（纯函数）
//! 2. `MessageTruncator`：按码点截断，保留代码块闭合
//! 3. `ChannelCredentialCache`：token 缓存，单飞刷新
//! 4. `NotificationDispatcher`：并发发送、重试、总时间预算
//!
//! # 使用示例
//! ```ignore
//! use board_notify::config::NotifyConfig;
//! use board_notify::notification::{ContentEvent, ContentType, NotificationBuilder};
//!
//! let dispatcher = NotificationBuilder::new(NotifyConfig::auto_load(None)?).build()?;
//! let event = ContentEvent::created(ContentType::Code, "main.rs", "fn main() {}")?;
//! let outcomes = dispatcher.notify(&event).await;
//! ```

pub mod builder;
pub mod channel;
pub mod channels;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod formatter;
pub mod truncator;

pub use builder::NotificationBuilder;
pub use channel::{ChannelKind, ChannelTransport, DeliveryStatus, Markup, TransportResult};
pub use credential::{AccessToken, ChannelCredentialCache, TokenProvider};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, RetryPolicy};
pub use error::{CredentialError, DispatchError};
pub use event::{ContentAction, ContentEvent, ContentType};
pub use formatter::{msg, FormattedMessage, MessageFormatter};
pub use truncator::{MessageTruncator, TRUNCATION_MARKER};
