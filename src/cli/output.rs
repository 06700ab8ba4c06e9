//! Output formatting for CLI commands

use serde::Serialize;

use crate::notification::DispatchOutcome;

/// Format output as pretty JSON
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// 单行展示一个渠道的分发结果
pub fn format_outcome(outcome: &DispatchOutcome) -> String {
    if outcome.delivered {
        return format!("✅ {} ({}) 已送达，尝试 {} 次", outcome.channel_id, outcome.kind, outcome.attempts);
    }
    let error = outcome
        .last_error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    format!(
        "❌ {} ({}) 发送失败，尝试 {} 次: {}",
        outcome.channel_id, outcome.kind, outcome.attempts, error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{ChannelKind, DispatchError};

    #[test]
    fn test_format_outcome() {
        let ok = DispatchOutcome {
            channel_id: "tg".to_string(),
            kind: ChannelKind::WebhookText,
            delivered: true,
            attempts: 1,
            last_error: None,
        };
        assert_eq!(format_outcome(&ok), "✅ tg (webhook_text) 已送达，尝试 1 次");

        let failed = DispatchOutcome {
            delivered: false,
            attempts: 2,
            last_error: Some(DispatchError::Timeout),
            ..ok
        };
        assert!(format_outcome(&failed).starts_with("❌ tg (webhook_text) 发送失败，尝试 2 次: dispatch budget exceeded"));
    }

    #[test]
    fn test_format_output_json() {
        let out = format_output(&vec!["a"]);
        assert_eq!(out, "[\n  \"a\"\n]");
    }
}
