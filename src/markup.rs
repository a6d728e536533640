//! Reader for the markup produced by [`crate::format`]
//!
//! The terminal cannot render HTML, so the tag subset is parsed back into
//! styled segments. Speech and clipboard use the plain-text views.

/// A fenced code block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeBlock {
    pub lang: Option<String>,
    /// Set once the block carries a copy affordance.
    pub copy_index: Option<usize>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text { text: String, bold: bool, code: bool },
    Break,
    CodeBlock(CodeBlock),
}

enum Tag {
    Break,
    Strong(bool),
    Code { open: bool, lang: Option<String> },
    Pre { open: bool, copy_index: Option<usize> },
}

/// Decode the two entities the formatter emits.
pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<").replace("&gt;", ">")
}

fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let key = format!("{name}=\"");
    let start = attrs.find(&key)? + key.len();
    let len = attrs[start..].find('"')?;
    Some(&attrs[start..start + len])
}

/// Try to read a known tag at the start of `rest`. Returns the tag and its
/// byte length.
fn read_tag(rest: &str) -> Option<(Tag, usize)> {
    let end = rest.find('>')?;
    let inner = &rest[1..end];
    let (closing, body) = match inner.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, inner),
    };
    let name_end = body
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(body.len());
    let (name, attrs) = body.split_at(name_end);

    let tag = match name {
        "br" if !closing => Tag::Break,
        "strong" => Tag::Strong(!closing),
        "code" => Tag::Code {
            open: !closing,
            lang: attr(attrs, "class")
                .and_then(|class| class.strip_prefix("language-"))
                .map(str::to_string),
        },
        "pre" => Tag::Pre {
            open: !closing,
            copy_index: attr(attrs, "data-copy").and_then(|n| n.parse().ok()),
        },
        _ => return None,
    };
    Some((tag, end + 1))
}

/// Parse markup into segments. Unknown tags stay literal text.
pub fn parse(markup: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut bold = false;
    let mut code = false;
    let mut block: Option<CodeBlock> = None;

    let flush = |buf: &mut String, segments: &mut Vec<Segment>, bold: bool, code: bool| {
        if !buf.is_empty() {
            segments.push(Segment::Text {
                text: decode_entities(buf),
                bold,
                code,
            });
            buf.clear();
        }
    };

    let mut rest = markup;
    while let Some(pos) = rest.find('<') {
        let (before, at) = rest.split_at(pos);
        buf.push_str(before);

        let Some((tag, len)) = read_tag(at) else {
            buf.push('<');
            rest = &at[1..];
            continue;
        };
        rest = &at[len..];

        if let Some(current) = block.as_mut() {
            match tag {
                Tag::Pre { open: false, .. } => {
                    current.text = decode_entities(&buf);
                    buf.clear();
                    if let Some(done) = block.take() {
                        segments.push(Segment::CodeBlock(done));
                    }
                }
                Tag::Code { open: true, lang } => current.lang = lang,
                Tag::Code { open: false, .. } => {}
                Tag::Break => buf.push('\n'),
                _ => {}
            }
            continue;
        }

        match tag {
            Tag::Break => {
                flush(&mut buf, &mut segments, bold, code);
                segments.push(Segment::Break);
            }
            Tag::Strong(open) => {
                flush(&mut buf, &mut segments, bold, code);
                bold = open;
            }
            Tag::Code { open, .. } => {
                flush(&mut buf, &mut segments, bold, code);
                code = open;
            }
            Tag::Pre { open: true, copy_index } => {
                flush(&mut buf, &mut segments, bold, code);
                block = Some(CodeBlock {
                    lang: None,
                    copy_index,
                    text: String::new(),
                });
            }
            Tag::Pre { open: false, .. } => {}
        }
    }
    buf.push_str(rest);

    match block.take() {
        // Unterminated block: keep what we have.
        Some(mut open) => {
            open.text = decode_entities(&buf);
            segments.push(Segment::CodeBlock(open));
        }
        None => flush(&mut buf, &mut segments, bold, code),
    }
    segments
}

fn plain(markup: &str, with_code: bool) -> String {
    let mut out = String::new();
    for segment in parse(markup) {
        match segment {
            Segment::Text { text, .. } => out.push_str(&text),
            Segment::Break => out.push('\n'),
            Segment::CodeBlock(block) => {
                if with_code {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(&block.text);
                }
            }
        }
    }
    out
}

/// Visible text, code blocks included.
pub fn to_plain(markup: &str) -> String {
    plain(markup, true)
}

/// Visible text with code blocks dropped.
pub fn prose(markup: &str) -> String {
    plain(markup, false)
}

/// Text of the code block annotated with copy index `index`.
pub fn code_block(markup: &str, index: usize) -> Option<String> {
    parse(markup).into_iter().find_map(|segment| match segment {
        Segment::CodeBlock(block) if block.copy_index == Some(index) => Some(block.text),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_inline_styles() {
        let segments = parse("a <strong>b</strong> <code>c</code><br>d &lt;e&gt;");
        assert_eq!(
            segments,
            vec![
                Segment::Text { text: "a ".into(), bold: false, code: false },
                Segment::Text { text: "b".into(), bold: true, code: false },
                Segment::Text { text: " ".into(), bold: false, code: false },
                Segment::Text { text: "c".into(), bold: false, code: true },
                Segment::Break,
                Segment::Text { text: "d <e>".into(), bold: false, code: false },
            ]
        );
    }

    #[test]
    fn test_parse_code_block() {
        let segments = parse("x<pre data-copy=\"2\"><code class=\"language-rs\">let a = 1 &lt; 2;\n</code></pre>y");
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments[1],
            Segment::CodeBlock(CodeBlock {
                lang: Some("rs".into()),
                copy_index: Some(2),
                text: "let a = 1 < 2;\n".into(),
            })
        );
    }

    #[test]
    fn test_unknown_tags_are_literal() {
        assert_eq!(to_plain("<div>hi</div> < 3"), "<div>hi</div> < 3");
    }

    #[test]
    fn test_prose_drops_code() {
        let markup = "Intro.<pre><code>secret()\n</code></pre>Outro.";
        assert_eq!(prose(markup), "Intro.Outro.");
        assert_eq!(to_plain(markup), "Intro.\nsecret()\nOutro.");
    }

    #[test]
    fn test_code_block_lookup() {
        let markup = "<pre data-copy=\"1\"><code>one</code></pre><pre data-copy=\"2\"><code>two</code></pre>";
        assert_eq!(code_block(markup, 2).as_deref(), Some("two"));
        assert_eq!(code_block(markup, 3), None);
    }
}
