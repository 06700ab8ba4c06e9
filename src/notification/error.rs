//! 通知错误分类
//!
//! 所有错误都在渠道尝试边界被捕获、分类，最终以数据形式出现在 `DispatchOutcome` 中。

use serde::Serialize;

use super::channel::{DeliveryStatus, TransportResult};

/// token 刷新失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialError {
    /// 渠道没有注册 token 来源
    #[error("no token provider registered for channel {channel_id}")]
    NotConfigured { channel_id: String },

    /// 认证接口明确拒绝（如 corpsecret 错误）
    #[error("auth endpoint rejected credentials (errcode {code}): {message}")]
    Rejected { code: i64, message: String },

    /// 网络错误或认证接口繁忙，可重试
    #[error("auth endpoint temporarily unavailable: {message}")]
    Transient { message: String },

    /// 响应无法解析
    #[error("invalid auth response: {message}")]
    InvalidResponse { message: String },
}

impl CredentialError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CredentialError::Transient { .. })
    }
}

/// 单个渠道的最终错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("credential refresh failed: {error}")]
    Credential { error: CredentialError },

    #[error("access token expired: {detail}")]
    AuthExpired { detail: String },

    #[error("rate limited: {detail}")]
    RateLimited { detail: String },

    #[error("transient error: {detail}")]
    Transient { detail: String },

    #[error("permanent error: {detail}")]
    Permanent { detail: String },

    #[error("dispatch budget exceeded before the channel finished")]
    Timeout,
}

impl DispatchError {
    /// 把传输层结果转换为错误，成功时返回 None
    pub fn from_transport(result: TransportResult) -> Option<Self> {
        let detail = result.detail.unwrap_or_default();
        match result.status {
            DeliveryStatus::Delivered => None,
            DeliveryStatus::AuthExpired => Some(DispatchError::AuthExpired { detail }),
            DeliveryStatus::RateLimited => Some(DispatchError::RateLimited { detail }),
            DeliveryStatus::TransientError => Some(DispatchError::Transient { detail }),
            DeliveryStatus::PermanentError => Some(DispatchError::Permanent { detail }),
        }
    }
}

impl From<CredentialError> for DispatchError {
    fn from(error: CredentialError) -> Self {
        DispatchError::Credential { error }
    }
}
