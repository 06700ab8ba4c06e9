//! 消息格式化模块 - 将内容事件转换为各渠道的通知文本
//!
//! 格式化是 `(event, kind)` 的纯函数：无 I/O、无随机数，相同输入得到逐字节相同的输出。
//!
//! 除文本外还记录两处结构信息，供截断器使用：
//! - 代码块（开始标记、内部、结束标记）的字节区间
//! - 链接行的字节区间（链接不能被截断在中间）

use std::ops::Range;

use super::channel::{ChannelKind, Markup};
use super::event::{ContentAction, ContentEvent, ContentType};

/// Notification message constants (Chinese)
pub mod msg {
    pub const UPDATED: &str = "内容已更新";
    pub const DELETED: &str = "🗑 内容已删除";
    pub const TITLE: &str = "标题:";
    pub const CONTENT: &str = "内容:";
    pub const LINK: &str = "链接:";
    pub const TYPE: &str = "类型:";
    pub const EDITED_FOOTER: &str = "此内容已被编辑";
    pub const DELETED_FOOTER: &str = "此内容已被永久删除";
}

/// 结构化块（代码块）在消息中的字节区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRange {
    /// 开始标记起点
    pub start: usize,
    /// 块内容起点（开始标记之后）
    pub interior_start: usize,
    /// 块内容终点（结束标记之前）
    pub interior_end: usize,
    /// 结束标记终点
    pub end: usize,
}

impl BlockRange {
    pub fn interior(&self) -> Range<usize> {
        self.interior_start..self.interior_end
    }
}

/// 格式化后的消息
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedMessage {
    pub text: String,
    pub markup: Markup,
    pub block: Option<BlockRange>,
    /// 链接行（不含换行符）
    pub link_line: Option<Range<usize>>,
}

impl FormattedMessage {
    /// 不带结构信息的纯文本消息
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::Plain,
            block: None,
            link_line: None,
        }
    }

    pub fn contains_structured_block(&self) -> bool {
        self.block.is_some()
    }

    /// 代码块内容（已按渠道规则转义）
    pub fn block_interior(&self) -> Option<&str> {
        self.block.as_ref().map(|b| &self.text[b.interior()])
    }
}

/// 边写边记录区间
struct Composer {
    markup: Markup,
    text: String,
    block: Option<BlockRange>,
    link_line: Option<Range<usize>>,
}

impl Composer {
    fn new(markup: Markup) -> Self {
        Self {
            markup,
            text: String::new(),
            block: None,
            link_line: None,
        }
    }

    fn push(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn push_bold(&mut self, s: &str) {
        match self.markup {
            Markup::Html => {
                self.text.push_str("<b>");
                self.text.push_str(s);
                self.text.push_str("</b>");
            }
            Markup::Markdown => {
                self.text.push_str("**");
                self.text.push_str(s);
                self.text.push_str("**");
            }
            Markup::Plain => self.text.push_str(s),
        }
    }

    fn push_italic(&mut self, s: &str) {
        match self.markup {
            Markup::Html => {
                self.text.push_str("<i>");
                self.text.push_str(s);
                self.text.push_str("</i>");
            }
            Markup::Markdown => {
                self.text.push('*');
                self.text.push_str(s);
                self.text.push('*');
            }
            Markup::Plain => self.text.push_str(s),
        }
    }

    fn push_escaped(&mut self, s: &str) {
        match self.markup {
            Markup::Html => self.text.push_str(&escape_html(s)),
            Markup::Markdown | Markup::Plain => self.text.push_str(s),
        }
    }

    fn push_code_block(&mut self, code: &str) {
        let (open, interior, close) = match self.markup {
            Markup::Html => (
                "<pre><code>".to_string(),
                escape_html(code),
                "</code></pre>".to_string(),
            ),
            Markup::Markdown | Markup::Plain => {
                let fence = fence_for(code);
                (format!("{}\n", fence), code.to_string(), format!("\n{}", fence))
            }
        };

        let start = self.text.len();
        self.text.push_str(&open);
        let interior_start = self.text.len();
        self.text.push_str(&interior);
        let interior_end = self.text.len();
        self.text.push_str(&close);
        self.block = Some(BlockRange {
            start,
            interior_start,
            interior_end,
            end: self.text.len(),
        });
    }

    fn push_link_line(&mut self, title: &str, url: &str) {
        let start = self.text.len();
        self.push_bold(msg::LINK);
        self.push(" ");
        match self.markup {
            Markup::Markdown => {
                self.text.push('[');
                self.text.push_str(title);
                self.text.push_str("](");
                self.text.push_str(url);
                self.text.push(')');
            }
            Markup::Html => self.push_escaped(url),
            Markup::Plain => self.push(url),
        }
        self.link_line = Some(start..self.text.len());
    }

    fn finish(self) -> FormattedMessage {
        FormattedMessage {
            text: self.text,
            markup: self.markup,
            block: self.block,
            link_line: self.link_line,
        }
    }
}

/// 消息格式化器
pub struct MessageFormatter;

impl MessageFormatter {
    /// 按渠道类型格式化事件
    pub fn format(event: &ContentEvent, kind: ChannelKind) -> FormattedMessage {
        let mut out = Composer::new(kind.markup());

        if event.action == ContentAction::Deleted {
            Self::write_deleted(&mut out, event);
            return out.finish();
        }

        let headline = match event.action {
            ContentAction::Updated => msg::UPDATED.to_string(),
            _ => format!("新{}上传", event.content_type.label()),
        };
        out.push_bold(&headline);
        out.push("\n\n");

        out.push_bold(msg::TITLE);
        out.push(" ");
        out.push_escaped(&event.title);
        out.push("\n");

        if event.content_type.is_link() {
            out.push_link_line(&event.title, &event.body);
        } else {
            out.push_bold(msg::CONTENT);
            out.push("\n");
            if event.content_type == ContentType::Code {
                out.push_code_block(&event.body);
            } else {
                out.push_escaped(&event.body);
            }
        }

        if event.action == ContentAction::Updated {
            out.push("\n\n");
            out.push_italic(msg::EDITED_FOOTER);
        }

        out.finish()
    }

    /// 删除通知只使用标题和类型
    fn write_deleted(out: &mut Composer, event: &ContentEvent) {
        out.push_bold(msg::DELETED);
        out.push("\n\n");
        out.push_bold(msg::TYPE);
        out.push(" ");
        out.push(event.content_type.label());
        out.push("\n");
        out.push_bold(msg::TITLE);
        out.push(" ");
        out.push_escaped(&event.title);
        out.push("\n\n");
        out.push_italic(msg::DELETED_FOOTER);
    }
}

/// HTML 转义
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 选择比内容中最长反引号串更长的 fence（至少 3 个）
fn fence_for(code: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in code.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_event(body: &str) -> ContentEvent {
        ContentEvent::created(ContentType::Code, "t", body).unwrap()
    }

    #[test]
    fn test_format_is_deterministic() {
        let event = code_event("fn main() { println!(\"<hi>\"); }");
        for kind in [ChannelKind::WebhookText, ChannelKind::WebhookMarkdown, ChannelKind::TokenApi] {
            let a = MessageFormatter::format(&event, kind);
            let b = MessageFormatter::format(&event, kind);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_html_code_block_escaped_inside_pre() {
        let event = code_event("if a < b && c > d {}");
        let msg = MessageFormatter::format(&event, ChannelKind::WebhookText);

        assert!(msg.text.starts_with("<b>新内容上传</b>\n\n<b>标题:</b> t\n"));
        assert!(msg.text.contains("<pre><code>if a &lt; b &amp;&amp; c &gt; d {}</code></pre>"));
        assert_eq!(msg.block_interior(), Some("if a &lt; b &amp;&amp; c &gt; d {}"));

        let block = msg.block.as_ref().unwrap();
        assert_eq!(&msg.text[block.start..block.interior_start], "<pre><code>");
        assert_eq!(&msg.text[block.interior_end..block.end], "</code></pre>");
    }

    #[test]
    fn test_markdown_code_passes_through_unescaped() {
        let event = code_event("a < b");
        let msg = MessageFormatter::format(&event, ChannelKind::WebhookMarkdown);
        assert!(msg.text.contains("```\na < b\n```"));
        assert_eq!(msg.block_interior(), Some("a < b"));
    }

    #[test]
    fn test_fence_grows_on_collision() {
        let event = code_event("```rust\nlet x = 1;\n```");
        let msg = MessageFormatter::format(&event, ChannelKind::TokenApi);
        let block = msg.block.as_ref().unwrap();
        assert_eq!(&msg.text[block.start..block.interior_start], "````\n");
        assert_eq!(&msg.text[block.interior_end..block.end], "\n````");
        assert_eq!(fence_for("no ticks"), "```");
        assert_eq!(fence_for("`````"), "``````");
    }

    #[test]
    fn test_poetry_preserves_line_breaks() {
        let body = "床前明月光\n疑是地上霜\n\n举头望明月";
        let event = ContentEvent::created(ContentType::Poetry, "静夜思", body).unwrap();
        for kind in [ChannelKind::WebhookText, ChannelKind::WebhookMarkdown, ChannelKind::TokenApi] {
            let msg = MessageFormatter::format(&event, kind);
            assert!(msg.text.contains(body), "kind {:?}: {}", kind, msg.text);
            assert!(!msg.contains_structured_block());
        }
    }

    #[test]
    fn test_deleted_image_has_no_link() {
        let event = ContentEvent::deleted(ContentType::Image, "photo.png").unwrap();
        for kind in [ChannelKind::WebhookText, ChannelKind::WebhookMarkdown, ChannelKind::TokenApi] {
            let msg = MessageFormatter::format(&event, kind);
            assert!(msg.text.contains("删除"));
            assert!(msg.text.contains("photo.png"));
            assert!(msg.text.contains("图片"));
            assert!(!msg.text.contains(msg::LINK));
            assert!(msg.link_line.is_none());
        }
    }

    #[test]
    fn test_deleted_ignores_body() {
        let mut event = ContentEvent::deleted(ContentType::Text, "note").unwrap();
        event.body = "secret body".to_string();
        let msg = MessageFormatter::format(&event, ChannelKind::TokenApi);
        assert!(!msg.text.contains("secret body"));
    }

    #[test]
    fn test_link_line_range() {
        let url = "https://example.com/files/report.pdf?a=1&b=2";
        let event = ContentEvent::created(ContentType::File, "report.pdf", url).unwrap();

        let plain = MessageFormatter::format(&event, ChannelKind::TokenApi);
        assert!(plain.text.starts_with("新文件上传\n\n"));
        let range = plain.link_line.clone().unwrap();
        assert_eq!(&plain.text[range], format!("链接: {}", url));

        let md = MessageFormatter::format(&event, ChannelKind::WebhookMarkdown);
        let range = md.link_line.clone().unwrap();
        assert_eq!(&md.text[range], format!("**链接:** [report.pdf]({})", url));

        let html = MessageFormatter::format(&event, ChannelKind::WebhookText);
        assert!(html.text.contains("a=1&amp;b=2"));
    }

    #[test]
    fn test_updated_has_footer() {
        let event = ContentEvent::updated(ContentType::Text, "t", "hello").unwrap();
        let html = MessageFormatter::format(&event, ChannelKind::WebhookText);
        assert!(html.text.starts_with("<b>内容已更新</b>"));
        assert!(html.text.ends_with("<i>此内容已被编辑</i>"));

        let plain = MessageFormatter::format(&event, ChannelKind::TokenApi);
        assert!(plain.text.ends_with("\n\n此内容已被编辑"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/a&gt;");
    }
}
