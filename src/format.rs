//! Light markdown to markup formatter
//!
//! Model output is rendered as a tiny HTML subset: `<strong>`, `<code>`,
//! `<pre><code>` and `<br>`. Angle brackets in the source text are always
//! escaped before any tag is inserted.
//!
//! Streaming fragments skip fenced-block promotion because a half-received
//! fence would swallow the rest of the response. When a turn finishes, the
//! accumulated streaming markup is fed back through [`format`] in final mode,
//! which first [`normalize`]s it to raw text. That makes the final mode a
//! fixed point on its own output and makes the result independent of how
//! the stream was chunked.

use regex::Regex;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(\w*)\n?(.*?)```").expect("fence regex"))
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold regex"))
}

fn inline_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]+)`").expect("inline code regex"))
}

fn break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<br\s*/?>").expect("break regex"))
}

fn block_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<pre(?: data-copy="\d+")?><code(?: class="language-(\w+)")?>"#)
            .expect("block open regex")
    })
}

/// Format `text` as markup.
///
/// `streaming = true` is used for each fragment as it arrives;
/// `streaming = false` for the finished response.
pub fn format(text: &str, streaming: bool) -> String {
    if streaming {
        format_fragment(text)
    } else {
        format_final(text)
    }
}

/// Escape angle brackets.
pub fn escape(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

/// Turn formatter markup back into the raw text it came from.
///
/// Raw text passes through unchanged apart from `<br>` becoming a newline
/// and `&lt;`/`&gt;` being decoded.
pub fn normalize(markup: &str) -> String {
    let text = break_re().replace_all(markup, "\n");
    let text = block_open_re().replace_all(&text, |caps: &regex::Captures<'_>| {
        let lang = caps.get(1).map_or("", |m| m.as_str());
        format!("```{lang}\n")
    });
    text.replace("</code></pre>", "```")
        .replace("<strong>", "**")
        .replace("</strong>", "**")
        .replace("<code>", "`")
        .replace("</code>", "`")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

fn format_fragment(text: &str) -> String {
    apply_inline(&escape(text)).replace('\n', "<br>")
}

fn format_final(text: &str) -> String {
    let escaped = escape(&normalize(text));
    let mut out = String::with_capacity(escaped.len() + 32);
    let mut last = 0;

    for caps in fence_re().captures_iter(&escaped) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&apply_inline(&escaped[last..whole.start()]));

        let lang = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());
        if lang.is_empty() {
            out.push_str("<pre><code>");
        } else {
            out.push_str(&format!("<pre><code class=\"language-{lang}\">"));
        }
        out.push_str(body);
        out.push_str("</code></pre>");

        last = whole.end();
    }
    out.push_str(&apply_inline(&escaped[last..]));
    out
}

fn apply_inline(text: &str) -> String {
    let bolded = bold_re().replace_all(text, "<strong>$1</strong>");
    inline_code_re()
        .replace_all(&bolded, "<code>$1</code>")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escapes_before_tagging() {
        assert_eq!(format("<script>**x**</script>", true), "&lt;script&gt;<strong>x</strong>&lt;/script&gt;");
        assert_eq!(format("a < b", false), "a &lt; b");
    }

    #[test]
    fn test_streaming_inline_and_breaks() {
        assert_eq!(format("use `ls`\nthen **go**", true), "use <code>ls</code><br>then <strong>go</strong>");
    }

    #[test]
    fn test_streaming_skips_fences() {
        let out = format("```py\nprint(1)", true);
        assert!(!out.contains("<pre>"));
        assert!(out.contains("<br>"));
    }

    #[test]
    fn test_final_promotes_fences() {
        let out = format("Run:\n```sh\necho <hi>\n```\ndone **ok**", false);
        assert_eq!(
            out,
            "Run:\n<pre><code class=\"language-sh\">echo &lt;hi&gt;\n</code></pre>\ndone <strong>ok</strong>"
        );
    }

    #[test]
    fn test_final_leaves_code_block_body_alone() {
        let out = format("```\na **b** `c`\n```", false);
        assert_eq!(out, "<pre><code>a **b** `c`\n</code></pre>");
    }

    #[test]
    fn test_final_converts_breaks() {
        assert_eq!(format("one<br>two", false), "one\ntwo");
    }

    #[test]
    fn test_final_is_idempotent() {
        let samples = [
            "plain text",
            "**bold** and `code` and <tag>",
            "```rust\nfn main() {}\n```\nafter",
            "```print()```",
            "``````",
            "**`a**`",
            "*****",
            "&lt;already escaped&gt;",
            "<br>literal break",
            "unclosed ```fence\nstill text",
            "mixed\n\n```\n<pre><code>inner</code></pre>\n```",
        ];
        for sample in samples {
            let once = format(sample, false);
            let twice = format(&once, false);
            assert_eq!(twice, once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_final_on_streamed_markup_matches_direct_final() {
        let raw = "Here:\n```js\nlet a = 1 < 2;\n```\n**done** `x`";
        let streamed = format(raw, true);
        assert_eq!(format(&streamed, false), format(raw, false));
    }

    #[test]
    fn test_normalize_strips_copy_annotation() {
        let markup = "<pre data-copy=\"3\"><code class=\"language-py\">x = 1\n</code></pre>";
        assert_eq!(normalize(markup), "```py\nx = 1\n```");
    }
}
