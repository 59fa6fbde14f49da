//! HTML to markdown cleanup.
//!
//! Good enough to hand a model the readable part of a page: boilerplate
//! blocks are dropped, headings, paragraphs, links and list items are kept.
//! Navigation and footer blocks are reduced to their links, which is where
//! page links usually live.

use regex::{Captures, Regex};
use std::sync::LazyLock;

struct Patterns {
    boilerplate: Vec<Regex>,
    chrome: Vec<Regex>,
    headings: Vec<(Regex, &'static str)>,
    paragraph: Regex,
    line_break: Regex,
    link: Regex,
    list_item: Regex,
    table_cell: Regex,
    table_row: Regex,
    tag: Regex,
    spaces: Regex,
    blank_lines: Regex,
    title: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| {
    let re = |p: &str| Regex::new(p).expect("static pattern");
    let block = |tag: &str| re(&format!(r"(?is)<{0}\b[^>]*>.*?</{0}>", tag));
    Patterns {
        boilerplate: ["script", "style", "noscript", "svg", "head"]
            .iter()
            .map(|tag| block(tag))
            .chain(std::iter::once(re(r"(?s)<!--.*?-->")))
            .collect(),
        chrome: ["nav", "footer"].iter().map(|tag| block(tag)).collect(),
        headings: vec![
            (re(r"(?is)<h1[^>]*>(.*?)</h1>"), "\n# $1\n"),
            (re(r"(?is)<h2[^>]*>(.*?)</h2>"), "\n## $1\n"),
            (re(r"(?is)<h3[^>]*>(.*?)</h3>"), "\n### $1\n"),
            (re(r"(?is)<h[4-6][^>]*>(.*?)</h[4-6]>"), "\n#### $1\n"),
        ],
        paragraph: re(r"(?is)<p[^>]*>(.*?)</p>"),
        line_break: re(r"(?i)<br\s*/?>"),
        link: re(r#"(?is)<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#),
        list_item: re(r"(?is)<li[^>]*>(.*?)</li>"),
        table_cell: re(r"(?i)</t[dh]>"),
        table_row: re(r"(?i)</tr>"),
        tag: re(r"<[^>]+>"),
        spaces: re(r"[ \t]+"),
        blank_lines: re(r"\n\s*\n(\s*\n)+"),
        title: re(r"(?is)<title[^>]*>(.*?)</title>"),
    }
});

/// Convert an HTML page to markdown-ish text.
pub fn html_to_markdown(html: &str) -> String {
    let p = &*PATTERNS;
    let mut text = html.to_string();

    for pattern in &p.boilerplate {
        text = pattern.replace_all(&text, "").into_owned();
    }
    for pattern in &p.chrome {
        text = pattern
            .replace_all(&text, |caps: &Captures| links_only(&caps[0]))
            .into_owned();
    }
    for (pattern, replacement) in &p.headings {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }

    text = p.paragraph.replace_all(&text, "$1\n\n").into_owned();
    text = p.line_break.replace_all(&text, "\n").into_owned();
    text = p.link.replace_all(&text, "[$2]($1)").into_owned();
    text = p.list_item.replace_all(&text, "- $1\n").into_owned();
    text = p.table_cell.replace_all(&text, " | ").into_owned();
    text = p.table_row.replace_all(&text, "\n").into_owned();
    text = p.tag.replace_all(&text, "").into_owned();

    text = decode_entities(&text);
    text = p.spaces.replace_all(&text, " ").into_owned();
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    text = lines.join("\n");
    text = p.blank_lines.replace_all(&text, "\n\n").into_owned();

    text.trim().to_string()
}

/// Keep only the anchors of a block, one per line.
fn links_only(block: &str) -> String {
    let links: Vec<String> = PATTERNS
        .link
        .captures_iter(block)
        .map(|cap| format!("<li>{}</li>", &cap[0]))
        .collect();
    if links.is_empty() {
        String::new()
    } else {
        format!("\n{}\n", links.join("\n"))
    }
}

/// Extract the `<title>` of an HTML page.
pub fn extract_title(html: &str) -> Option<String> {
    PATTERNS
        .title
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|t| !t.is_empty())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
