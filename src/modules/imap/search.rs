// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

/// Builds the UID SEARCH criteria for a free-text query: a nested OR over
/// FROM, SUBJECT, TO, CC, and BODY. TEXT is deliberately avoided; several
/// widely deployed servers mishandle it.
pub fn build_search_criteria(query: &str) -> String {
    let quoted = quote_string(query);
    format!(
        "OR FROM {q} OR SUBJECT {q} OR TO {q} OR CC {q} BODY {q}",
        q = quoted
    )
}

/// `SINCE` criteria for a window cutoff in epoch milliseconds, using the
/// RFC 3501 date-text form (e.g. `SINCE 02-Jan-2006`).
pub fn since_criteria(cutoff_millis: i64) -> String {
    use chrono::{TimeZone, Utc};
    let date = Utc
        .timestamp_millis_opt(cutoff_millis)
        .single()
        .unwrap_or_else(Utc::now);
    format!("SINCE {}", date.format("%d-%b-%Y"))
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\r' | '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
