// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use encoding_rs::Encoding;
use tracing::debug;

/// Candidate codecs tried, in order, when the declared charset produced
/// mojibake or nothing was declared. GB18030 first: it is a superset of
/// GBK/GB2312 and decodes most mislabeled mainland mail.
const CJK_CANDIDATES: &[&str] = &["gb18030", "gbk", "gb2312", "big5", "euc-tw"];

/// Decoded text that trips any of these rules is treated as a failed
/// decode and sent back through the recovery ladder:
/// - more than 10% U+FFFD replacement characters
/// - more than 5% CJK Extension B codepoints (a classic double-decode artifact)
/// - a run of 8+ consecutive Latin-1-supplement-style characters, or more
///   than half of the non-whitespace characters being such, the signature
///   of CJK bytes run through a single-byte Latin codec
pub fn looks_like_gibberish(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let mut total = 0usize;
    let mut replacement = 0usize;
    let mut cjk_ext_b = 0usize;
    let mut suspicious = 0usize;
    let mut non_space = 0usize;
    let mut run = 0usize;
    let mut max_run = 0usize;

    for c in text.chars() {
        total += 1;
        if !c.is_whitespace() {
            non_space += 1;
        }
        match c as u32 {
            0xFFFD => replacement += 1,
            0x20000..=0x2A6DF => cjk_ext_b += 1,
            _ => {}
        }
        if is_mojibake_char(c) {
            suspicious += 1;
            run += 1;
            max_run = max_run.max(run);
        } else {
            run = 0;
        }
    }

    if replacement * 10 > total {
        return true;
    }
    if cjk_ext_b * 20 > total {
        return true;
    }
    if max_run >= 8 {
        return true;
    }
    non_space > 0 && suspicious * 2 > non_space
}

/// Characters that single-byte Latin codecs produce from CJK bytes:
/// the Latin-1 supplement plus the windows-1252 0x80..0x9F specials.
fn is_mojibake_char(c: char) -> bool {
    matches!(c as u32, 0x80..=0xFF)
        || matches!(
            c,
            '\u{20AC}' | '\u{201A}' | '\u{0192}' | '\u{201E}' | '\u{2026}' | '\u{2020}'
                | '\u{2021}' | '\u{02C6}' | '\u{2030}' | '\u{0160}' | '\u{2039}' | '\u{0152}'
                | '\u{017D}' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' | '\u{2022}'
                | '\u{2013}' | '\u{2014}' | '\u{02DC}' | '\u{2122}' | '\u{0161}' | '\u{203A}'
                | '\u{0153}' | '\u{017E}' | '\u{0178}'
        )
}

/// Decodes the bytes of one text part, recovering from missing, wrong, or
/// aliased charset declarations. Total-function: always returns a string.
pub fn decode_text(raw: &[u8], declared: Option<&str>, is_html: bool) -> String {
    let declared = declared
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            if is_html {
                scan_html_meta_charset(raw)
            } else {
                None
            }
        });

    let declared = declared.map(|c| c.to_ascii_lowercase());
    match declared.as_deref() {
        None | Some("utf-8") | Some("utf8") | Some("us-ascii") | Some("ascii") => {
            if let Ok(text) = std::str::from_utf8(raw) {
                if !looks_like_gibberish(text) {
                    return text.to_string();
                }
            }
            detect_encoding(raw).unwrap_or_else(|| String::from_utf8_lossy(raw).into_owned())
        }
        Some(charset) => {
            let decoded = decode_with_label(raw, charset);
            match decoded {
                Some(text) if !looks_like_gibberish(&text) => text,
                first_attempt => {
                    debug!(
                        "charset '{}' produced gibberish or is unknown, trying detection",
                        charset
                    );
                    detect_encoding(raw)
                        .or(first_attempt)
                        .unwrap_or_else(|| String::from_utf8_lossy(raw).into_owned())
                }
            }
        }
    }
}

/// Candidate scan standing in for a dedicated detector: accept the first
/// codec whose output decodes cleanly and does not look like gibberish.
fn detect_encoding(raw: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(raw) {
        if !looks_like_gibberish(text) {
            return Some(text.to_string());
        }
    }
    for label in CJK_CANDIDATES {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            let (text, _, had_errors) = encoding.decode(raw);
            if !had_errors && !looks_like_gibberish(&text) {
                return Some(text.into_owned());
            }
        }
    }
    None
}

fn decode_with_label(raw: &[u8], charset: &str) -> Option<String> {
    let label = apply_alias(&charset.to_ascii_lowercase());
    let encoding = Encoding::for_label(label.as_bytes())?;
    let (text, _, _) = encoding.decode(raw);
    Some(text.into_owned())
}

/// Known mislabels seen in the wild.
fn apply_alias(charset: &str) -> String {
    match charset {
        "gb2312" | "x-gbk" => "gbk".to_string(),
        "x-big5" => "big5".to_string(),
        other => other.to_string(),
    }
}

/// Scans the first 1024 bytes of an HTML part for `<meta charset=...>` or
/// `<meta http-equiv="Content-Type" ... charset=...>`.
pub fn scan_html_meta_charset(raw: &[u8]) -> Option<String> {
    use regex::bytes::Regex;
    use std::sync::OnceLock;

    static META_CHARSET: OnceLock<Regex> = OnceLock::new();
    let re = META_CHARSET.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9_.:-]+)"#).unwrap()
    });

    let head = &raw[..raw.len().min(1024)];
    re.captures(head)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_utf8_passes_through() {
        let text = "Quarterly budget review — see attached.";
        assert_eq!(decode_text(text.as_bytes(), Some("utf-8"), false), text);
        assert_eq!(decode_text(text.as_bytes(), None, false), text);
    }

    #[test]
    fn declared_gbk_alias_decodes() {
        let (encoded, _, _) = encoding_rs::GBK.encode("你好，世界。预算会议在周五。");
        let decoded = decode_text(&encoded, Some("gb2312"), false);
        assert!(decoded.contains("你好"));
        assert!(decoded.contains("预算"));
    }

    #[test]
    fn mislabeled_latin1_recovers_via_candidate_scan() {
        let (encoded, _, _) = encoding_rs::GBK.encode("这是一封中文邮件，内容是季度预算。");
        let decoded = decode_text(&encoded, Some("iso-8859-1"), false);
        assert!(decoded.contains("中文邮件"), "got: {decoded}");
    }

    #[test]
    fn undeclared_gbk_detected() {
        let (encoded, _, _) = encoding_rs::GBK.encode("会议纪要：下周一发布新版本。");
        let decoded = decode_text(&encoded, None, false);
        assert!(decoded.contains("会议纪要"), "got: {decoded}");
    }

    #[test]
    fn html_meta_charset_scan() {
        let html = br#"<html><head><meta http-equiv="Content-Type" content="text/html; charset=gb2312"></head>"#;
        assert_eq!(scan_html_meta_charset(html).as_deref(), Some("gb2312"));
        let html5 = br#"<!doctype html><meta charset="big5">"#;
        assert_eq!(scan_html_meta_charset(html5).as_deref(), Some("big5"));
        assert_eq!(scan_html_meta_charset(b"<html><body>no meta"), None);
    }

    #[test]
    fn gibberish_heuristics() {
        assert!(!looks_like_gibberish("Bonjour, voici le café d'été."));
        assert!(!looks_like_gibberish(""));
        // GBK bytes decoded as latin-1 land almost entirely in 0x80..0xFF
        let (encoded, _, _) = encoding_rs::GBK.encode("中文内容测试测试测试");
        let (mojibake, _, _) = encoding_rs::WINDOWS_1252.decode(&encoded);
        assert!(looks_like_gibberish(&mojibake));
    }
}
