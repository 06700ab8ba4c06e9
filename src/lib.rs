//! Board Notify - 内容变更多渠道通知分发

pub mod cli;
pub mod config;
pub mod notification;

pub use config::{ChannelConfig, ChannelSettings, ConfigError, DispatchSettings, NotifyConfig};
pub use notification::{
    ChannelCredentialCache, ChannelKind, ContentAction, ContentEvent, ContentType, DispatchError,
    DispatchOutcome, NotificationBuilder, NotificationDispatcher,
};
