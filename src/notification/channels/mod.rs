//! 具体渠道实现

pub mod telegram;
pub mod wecom;
pub mod wecom_app;
pub mod wecom_robot;

pub use telegram::{TelegramConfig, TelegramTransport};
pub use wecom_app::{WecomAppConfig, WecomAppTransport, WecomTokenClient};
pub use wecom_robot::{WecomRobotConfig, WecomRobotTransport};
