// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

const SNIPPET_MAX_CHARS: usize = 200;

/// Builds the message-list preview from body text, falling back to HTML
/// with tags stripped. Quoted lines are dropped, whitespace collapsed,
/// and the result truncated at 200 characters with an ellipsis.
pub fn make_snippet(body_text: &str, body_html: &str) -> String {
    let source = if !body_text.trim().is_empty() {
        body_text.to_string()
    } else {
        strip_html_tags(body_html)
    };

    let mut collapsed = String::with_capacity(SNIPPET_MAX_CHARS + 8);
    let mut last_was_space = true;
    for line in source.lines() {
        let line = line.trim();
        if line.starts_with('>') {
            continue;
        }
        for c in line.chars() {
            if c.is_whitespace() {
                if !last_was_space {
                    collapsed.push(' ');
                    last_was_space = true;
                }
            } else {
                collapsed.push(c);
                last_was_space = false;
            }
        }
        if !last_was_space {
            collapsed.push(' ');
            last_was_space = true;
        }
        if collapsed.chars().count() > SNIPPET_MAX_CHARS + 8 {
            break;
        }
    }

    let trimmed = collapsed.trim();
    let count = trimmed.chars().count();
    if count > SNIPPET_MAX_CHARS {
        let truncated: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
        format!("{}…", truncated.trim_end())
    } else {
        trimmed.to_string()
    }
}

/// Minimal tag stripper for snippet extraction; rendering-quality HTML
/// handling stays with the host's sanitizer and viewer.
pub fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices().peekable();
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;
    let lower = html.to_ascii_lowercase();

    while let Some((idx, c)) = chars.next() {
        if let Some(close) = skip_until {
            if lower[idx..].starts_with(close) {
                for _ in 0..close.len() - 1 {
                    chars.next();
                }
                skip_until = None;
                in_tag = false;
            }
            continue;
        }
        match c {
            '<' => {
                if lower[idx..].starts_with("<style") {
                    skip_until = Some("</style>");
                } else if lower[idx..].starts_with("<script") {
                    skip_until = Some("</script>");
                } else {
                    in_tag = true;
                }
            }
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    decode_basic_entities(&out)
}

fn decode_basic_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
