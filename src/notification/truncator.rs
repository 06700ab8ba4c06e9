//! 消息截断 - 按渠道长度上限截断，尽量保持代码块完整
//!
//! 长度一律按 Unicode 码点计算，截断点总在码点边界上。
//!
//! 算法：
//! 1. 未超长，原样返回
//! 2. 有代码块且块外文本放得下：只截断块内容，标记放在块内，开始/结束标记保持成对
//! 3. 否则整体截断尾部并追加标记。此时可能切到结构标记中间，这是已知且接受的情况；
//!    唯一的例外是链接行：若截断点落在链接行内，整行丢弃

use super::channel::Markup;
use super::formatter::FormattedMessage;

/// 截断标记
pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// 消息截断器
pub struct MessageTruncator;

impl MessageTruncator {
    /// 截断到 `max_len` 个码点以内，从不失败
    pub fn truncate(message: &FormattedMessage, max_len: usize) -> String {
        let text = &message.text;
        let total = text.chars().count();
        if total <= max_len {
            return text.clone();
        }

        let marker_len = TRUNCATION_MARKER.chars().count();
        if max_len < marker_len {
            return prefix_chars(text, max_len).to_string();
        }

        if message.block.is_some() {
            if let Some(truncated) = Self::truncate_block(message, total, max_len, marker_len) {
                return truncated;
            }
        }

        Self::truncate_tail(message, max_len, marker_len)
    }

    /// 先按码点截断，再保证 UTF-8 字节数不超过 `max_bytes`
    ///
    /// 超出字节上限时按平均字节宽度缩小码点上限重新截断，码块和标记规则不变。
    pub fn truncate_within(message: &FormattedMessage, max_len: usize, max_bytes: Option<usize>) -> String {
        let mut limit = max_len;
        loop {
            let out = Self::truncate(message, limit);
            let Some(max_bytes) = max_bytes else {
                return out;
            };
            if out.len() <= max_bytes || limit == 0 {
                return out;
            }

            let chars = out.chars().count();
            limit = (chars * max_bytes / out.len()).min(chars.saturating_sub(1));
        }
    }

    /// 纯文本截断（没有结构信息）
    pub fn truncate_text(text: &str, max_len: usize) -> String {
        Self::truncate(&FormattedMessage::plain(text), max_len)
    }

    fn truncate_block(
        message: &FormattedMessage,
        total: usize,
        max_len: usize,
        marker_len: usize,
    ) -> Option<String> {
        let block = message.block.as_ref()?;
        let text = &message.text;
        let interior = &text[block.interior()];
        let outside = total - interior.chars().count();

        let available = max_len.checked_sub(outside + marker_len)?;
        if available == 0 {
            return None;
        }

        let kept = safe_prefix(prefix_chars(interior, available), message.markup);
        let mut out = String::with_capacity(text.len());
        out.push_str(&text[..block.interior_start]);
        out.push_str(kept);
        out.push_str(TRUNCATION_MARKER);
        out.push_str(&text[block.interior_end..]);
        Some(out)
    }

    fn truncate_tail(message: &FormattedMessage, max_len: usize, marker_len: usize) -> String {
        let text = &message.text;
        let mut cut = prefix_chars(text, max_len - marker_len).len();

        if let Some(link) = &message.link_line {
            if cut > link.start && cut < link.end {
                cut = link.start;
            }
        }

        let kept = safe_prefix(&text[..cut], message.markup);
        format!("{}{}", kept, TRUNCATION_MARKER)
    }
}

/// 前 n 个码点
fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// HTML 下不留半截实体（`&am`）或半截标签（`<co`）
fn safe_prefix(s: &str, markup: Markup) -> &str {
    if markup != Markup::Html {
        return s;
    }

    let mut end = s.len();
    if let Some(amp) = s.rfind('&') {
        if !s[amp..].contains(';') {
            end = end.min(amp);
        }
    }
    if let Some(lt) = s.rfind('<') {
        if !s[lt..].contains('>') {
            end = end.min(lt);
        }
    }
    &s[..end]
}
