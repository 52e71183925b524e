// ABOUTME: Display rendering for drafts - truncation, liveness cursor, progress footer.
// ABOUTME: Also converts markdown to the Telegram HTML subset and strips markup for plain fallback.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::fmt::Write;

/// Placeholder shown before the agent produces anything
pub const PLACEHOLDER: &str = "⏳ Thinking...";

/// Prepended when only the tail of a long draft fits
pub const STREAMING_PREFIX: &str = "⏳ (streaming, showing latest)…\n\n";

/// Liveness indicator appended while a turn is still streaming
pub const CURSOR: &str = " ▌";

const FENCE: &str = "```";

/// Longest progress line shown beneath a draft
pub const MAX_PROGRESS_CHARS: usize = 200;

/// Build the text shown for an in-progress draft.
///
/// The answer is truncated to its tail when it would not fit in
/// `max_len - reserve` characters, gets the cursor unless that would land
/// inside an open code fence, and the latest progress line goes underneath.
/// The progress line is clipped so the whole draft stays within `max_len`.
pub fn render_draft(text: &str, progress: Option<&str>, max_len: usize, reserve: usize) -> String {
    let reserve = reserve.max(CURSOR.chars().count());
    let room = max_len.saturating_sub(reserve);

    if text.trim().is_empty() {
        return match progress {
            Some(p) => clip_line(p, max_len),
            None => PLACEHOLDER.to_string(),
        };
    }

    let footer = progress
        .map(|p| format!("\n\n{}", clip_line(p, MAX_PROGRESS_CHARS.min(room / 2))))
        .unwrap_or_default();
    let budget = room.saturating_sub(footer.chars().count());

    let mut body = truncate_for_display(text, budget);
    if wants_cursor(&body) {
        body.push_str(CURSOR);
    }
    body.push_str(&footer);
    body
}

/// Cut `line` to at most `max_chars`, marking the cut with an ellipsis
fn clip_line(line: &str, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(max_chars.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

/// Keep the tail of `text` so the result, prefix included, is at most `budget` chars
pub fn truncate_for_display(text: &str, budget: usize) -> String {
    let len = text.chars().count();
    if len <= budget {
        return text.to_string();
    }

    let keep = budget.saturating_sub(STREAMING_PREFIX.chars().count());
    let tail: String = text.chars().skip(len - keep).collect();
    format!("{}{}", STREAMING_PREFIX, tail)
}

fn wants_cursor(text: &str) -> bool {
    !text.ends_with(CURSOR) && !inside_open_fence(text)
}

/// An odd number of ``` markers means the text ends inside a code block
pub fn inside_open_fence(text: &str) -> bool {
    text.matches(FENCE).count() % 2 == 1
}

/// Convert markdown to the HTML subset Telegram accepts
/// (b, i, s, code, pre, a).
///
/// Headings become bold lines, list items get bullets or numbers, and
/// any raw HTML in the input is escaped rather than passed through.
pub fn markdown_to_telegram_html(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() + markdown.len() / 4);
    let mut lists: Vec<Option<u64>> = Vec::new();

    for event in Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { .. } | Tag::Strong => out.push_str("<b>"),
                Tag::Emphasis => out.push_str("<i>"),
                Tag::Strikethrough => out.push_str("<s>"),
                Tag::CodeBlock(CodeBlockKind::Fenced(lang)) if !lang.is_empty() => {
                    let _ = write!(
                        out,
                        "<pre><code class=\"language-{}\">",
                        escape_html(lang.split_whitespace().next().unwrap_or(""))
                    );
                }
                Tag::CodeBlock(_) => out.push_str("<pre><code>"),
                Tag::Link { dest_url, .. } => {
                    let _ = write!(out, "<a href=\"{}\">", escape_html(&dest_url));
                }
                Tag::List(start) => {
                    start_line(&mut out);
                    lists.push(start);
                }
                Tag::Item => {
                    start_line(&mut out);
                    let depth = lists.len().saturating_sub(1);
                    out.push_str(&"  ".repeat(depth));
                    match lists.last_mut() {
                        Some(Some(n)) => {
                            let _ = write!(out, "{}. ", n);
                            *n += 1;
                        }
                        _ => out.push_str("• "),
                    }
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Paragraph => out.push_str("\n\n"),
                TagEnd::Heading(_) => out.push_str("</b>\n\n"),
                TagEnd::Strong => out.push_str("</b>"),
                TagEnd::Emphasis => out.push_str("</i>"),
                TagEnd::Strikethrough => out.push_str("</s>"),
                TagEnd::CodeBlock => out.push_str("</code></pre>\n\n"),
                TagEnd::Link => out.push_str("</a>"),
                TagEnd::Item => start_line(&mut out),
                TagEnd::List(_) => {
                    lists.pop();
                    if lists.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(text) => out.push_str(&escape_html(&text)),
            Event::Code(code) => {
                let _ = write!(out, "<code>{}</code>", escape_html(&code));
            }
            Event::Html(raw) | Event::InlineHtml(raw) => out.push_str(&escape_html(&raw)),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => out.push_str("―――\n\n"),
            Event::TaskListMarker(done) => out.push_str(if done { "☑ " } else { "☐ " }),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Plain-text fallback: drop the markdown markers a surface might choke on.
///
/// Paired markers (`**`, `__`, `~~`, backticks) and heading hashes are
/// removed; lone `*` and `_` stay so identifiers like `snake_case` survive.
pub fn strip_markup(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let line = if trimmed.starts_with('#') {
                trimmed.trim_start_matches('#').trim_start()
            } else {
                line
            };
            line.replace("**", "")
                .replace("__", "")
                .replace("~~", "")
                .replace('`', "")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
