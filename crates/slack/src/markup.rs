//! Rendering of internal rich-text and update summaries into Slack mrkdwn.

use tether_core::domain::message::{RichText, RichTextBlock, RichTextSpan};

pub fn render_rich_text(content: &RichText) -> String {
    let mut out = String::new();
    for block in &content.blocks {
        if !out.is_empty() {
            out.push('\n');
        }
        match block {
            RichTextBlock::Paragraph { spans } => {
                for span in spans {
                    out.push_str(&render_span(span));
                }
            }
            RichTextBlock::CodeBlock { text } => {
                out.push_str("```");
                out.push('\n');
                out.push_str(text);
                out.push('\n');
                out.push_str("```");
            }
        }
    }
    out
}

fn render_span(span: &RichTextSpan) -> String {
    let mut text = span.text.clone();
    if span.code {
        text = format!("`{text}`");
    }
    if span.bold {
        text = format!("*{text}*");
    }
    if span.italic {
        text = format!("_{text}_");
    }
    if let Some(link) = &span.link {
        text = format!("<{link}|{text}>");
    }
    text
}

/// Courtesy reply posted under a newly imported thread.
pub fn tracked_notice() -> String {
    ":link: This conversation is now tracked in the support portal. Replies here stay in sync."
        .to_string()
}

#[cfg(test)]
mod tests {
    use tether_core::domain::message::{RichText, RichTextBlock, RichTextSpan};

    use super::{render_rich_text, tracked_notice};

    #[test]
    fn renders_marks_in_mrkdwn_order() {
        let content = RichText {
            blocks: vec![RichTextBlock::Paragraph {
                spans: vec![
                    RichTextSpan::plain("deploy "),
                    RichTextSpan { bold: true, ..RichTextSpan::plain("failed") },
                    RichTextSpan::plain(" on "),
                    RichTextSpan { code: true, ..RichTextSpan::plain("main") },
                ],
            }],
        };

        assert_eq!(render_rich_text(&content), "deploy *failed* on `main`");
    }

    #[test]
    fn renders_links_and_code_blocks() {
        let content = RichText {
            blocks: vec![
                RichTextBlock::Paragraph {
                    spans: vec![RichTextSpan {
                        link: Some("https://status.example.com".to_string()),
                        ..RichTextSpan::plain("status page")
                    }],
                },
                RichTextBlock::CodeBlock { text: "error: connection reset".to_string() },
            ],
        };

        assert_eq!(
            render_rich_text(&content),
            "<https://status.example.com|status page>\n```\nerror: connection reset\n```"
        );
    }

    #[test]
    fn tracked_notice_is_a_single_line() {
        assert!(!tracked_notice().contains('\n'));
    }
}
