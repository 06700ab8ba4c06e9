//! 企业微信通用响应信封 `{errcode, errmsg}` 及错误码分类
//!
//! 群机器人和应用消息共用同一张错误码表。

use serde::Deserialize;

use crate::notification::channel::{DeliveryStatus, TransportResult};

/// 企业微信 API 基础 URL
pub const DEFAULT_API_BASE: &str = "https://qyapi.weixin.qq.com";

/// 系统繁忙
pub const ERRCODE_BUSY: i64 = -1;
/// access_token 已过期
pub const ERRCODE_TOKEN_EXPIRED: i64 = 42001;
/// 不合法的 access_token
pub const ERRCODE_TOKEN_INVALID: i64 = 40014;
/// 接口调用超过限制
pub const ERRCODE_FREQ_LIMIT: i64 = 45009;
/// 接口并发调用超过限制
pub const ERRCODE_CONCURRENCY_LIMIT: i64 = 45033;

#[derive(Debug, Deserialize)]
pub(crate) struct WecomResponse {
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

/// 错误码 -> 分类；未知错误码一律视为永久错误
pub fn classify_errcode(errcode: i64) -> DeliveryStatus {
    match errcode {
        0 => DeliveryStatus::Delivered,
        ERRCODE_TOKEN_EXPIRED | ERRCODE_TOKEN_INVALID => DeliveryStatus::AuthExpired,
        ERRCODE_FREQ_LIMIT | ERRCODE_CONCURRENCY_LIMIT => DeliveryStatus::RateLimited,
        ERRCODE_BUSY => DeliveryStatus::TransientError,
        // 40001 secret 错误、40056 agentid 错误、81013 接收人无效、93000 webhook 无效、
        // 44004 内容为空、45002 内容超长 等
        _ => DeliveryStatus::PermanentError,
    }
}

/// 将 HTTP 状态和 body 映射为封闭分类
pub fn classify_response(http_status: u16, body: &str) -> TransportResult {
    if http_status == 429 {
        return TransportResult::failed(DeliveryStatus::RateLimited, "HTTP 429");
    }

    match serde_json::from_str::<WecomResponse>(body) {
        Ok(response) => match classify_errcode(response.errcode) {
            DeliveryStatus::Delivered => TransportResult::delivered(),
            status => TransportResult::failed(
                status,
                format!("errcode {}: {}", response.errcode, response.errmsg),
            ),
        },
        Err(_) => TransportResult::failed(
            DeliveryStatus::TransientError,
            format!("unparseable WeCom response (HTTP {})", http_status),
        ),
    }
}
