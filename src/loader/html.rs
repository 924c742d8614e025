//! HTML to plain text, with heading provenance.
//!
//! A small tag-stripping scanner: `<script>`/`<style>` bodies are elided,
//! block-level tags become newlines, and `<h1>`-`<h6>` contents are recorded
//! as section breaks. Offsets are character offsets into the output text.

use super::SectionBreak;

/// Output accumulator that tracks its own character length so section
/// offsets stay consistent without re-counting.
struct Writer {
    out: String,
    chars: usize,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            chars: 0,
        }
    }

    fn push(&mut self, c: char) {
        self.out.push(c);
        self.chars += 1;
    }

    fn push_space(&mut self) {
        if !matches!(self.out.chars().last(), None | Some(' ') | Some('\n')) {
            self.push(' ');
        }
    }

    fn push_newline(&mut self) {
        if !matches!(self.out.chars().last(), None | Some('\n')) {
            self.push('\n');
        }
    }
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "table", "tr", "section", "article", "header", "footer",
    "blockquote", "pre",
];

pub(crate) fn extract(html: &str) -> (String, Vec<SectionBreak>) {
    let chars: Vec<char> = html.chars().collect();
    let mut writer = Writer::new();
    let mut sections = Vec::new();
    let mut heading_start: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '<' {
            if chars[i].is_whitespace() {
                writer.push_space();
            } else {
                writer.push(chars[i]);
            }
            i += 1;
            continue;
        }

        let Some(close) = find_tag_close(&chars, i) else {
            // dangling '<' at EOF, treat the rest as text
            writer.push_space();
            i += 1;
            continue;
        };

        let tag: String = chars[i + 1..close].iter().collect::<String>().to_lowercase();
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '>')
            .next()
            .unwrap_or("")
            .to_string();
        let is_closing = tag.starts_with('/');
        i = close + 1;

        match name.as_str() {
            "script" | "style" if !is_closing => {
                i = skip_to_closing_tag(&chars, i, &name);
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                writer.push_newline();
                if is_closing {
                    if let Some(start) = heading_start.take() {
                        let label: String = writer.out.chars().skip(start).collect();
                        let label = label.trim().to_string();
                        if !label.is_empty() {
                            sections.push(SectionBreak {
                                offset: start,
                                label,
                            });
                        }
                    }
                } else {
                    heading_start = Some(writer.chars);
                }
            }
            n if BLOCK_TAGS.contains(&n) => writer.push_newline(),
            _ => writer.push_space(),
        }
    }

    let text = writer
        .out
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    // re-anchor section offsets after the final trim pass
    let sections = sections
        .into_iter()
        .filter_map(|s| {
            find_char_offset(&text, &s.label).map(|offset| SectionBreak {
                offset,
                label: s.label,
            })
        })
        .collect();

    (text.trim().to_string(), sections)
}

fn find_tag_close(chars: &[char], open: usize) -> Option<usize> {
    chars[open..].iter().position(|&c| c == '>').map(|p| open + p)
}

fn skip_to_closing_tag(chars: &[char], from: usize, name: &str) -> usize {
    let needle: Vec<char> = format!("</{name}").chars().collect();
    let mut i = from;
    while i + needle.len() <= chars.len() {
        if chars[i..i + needle.len()]
            .iter()
            .zip(needle.iter())
            .all(|(a, b)| a.to_lowercase().eq(b.to_lowercase()))
        {
            // swallow through the '>'
            return match find_tag_close(chars, i) {
                Some(close) => close + 1,
                None => chars.len(),
            };
        }
        i += 1;
    }
    chars.len()
}

/// Character offset of the first occurrence of `needle` in `haystack`.
fn find_char_offset(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte_pos| haystack[..byte_pos].chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_scripts() {
        let html = r#"
            <html>
            <head><script>var x = 1;</script><style>body { color: red }</style></head>
            <body>
                <h1>Hello</h1>
                <p>World</p>
            </body>
            </html>
        "#;

        let (text, sections) = extract(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains('<'));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color"));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].label, "Hello");
    }

    #[test]
    fn heading_offsets_point_at_heading_text() {
        let html = "<h2>Refunds</h2><p>Thirty days.</p><h2>Shipping</h2><p>Two weeks.</p>";
        let (text, sections) = extract(html);

        assert_eq!(sections.len(), 2);
        let refunds = &sections[0];
        let tail: String = text.chars().skip(refunds.offset).take(7).collect();
        assert_eq!(tail, "Refunds");
    }

    #[test]
    fn unterminated_tag_does_not_panic() {
        let (text, _) = extract("before <unclosed");
        assert!(text.contains("before"));
    }
}
