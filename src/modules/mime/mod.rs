// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::security::{
    classify_envelope, PgpVerifier, SecureEnvelope, SmimeVerifier,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use mail_parser::{Encoding, Message, MessageParser, MimeHeaders, PartType};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod charset;
pub mod snippet;

/// Hard cap on a full raw message; anything beyond is dropped on the floor.
pub const MAX_RAW_MESSAGE_SIZE: usize = 50 * 1024 * 1024;
/// Hard cap on the bytes read out of a single MIME part.
pub const MAX_PART_SIZE: usize = 10 * 1024 * 1024;
/// Inline attachments up to this size keep their content; larger ones keep
/// metadata only and are fetched on demand.
pub const MAX_INLINE_CONTENT_SIZE: usize = 5 * 1024 * 1024;
/// Cap on the best-effort fallback extraction.
pub const MAX_FALLBACK_TEXT: usize = 10 * 1024;
/// Soft per-message parse deadline; on expiry the fallback extraction is
/// returned instead of an error.
pub const PARSE_DEADLINE: Duration = Duration::from_secs(30);

const FALLBACK_TRUNCATION_MARKER: &str = "\n[truncated]";

/// Attachment metadata (and content, for small inline parts) discovered
/// during the multipart walk.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedAttachment {
    pub filename: String,
    pub content_type: String,
    pub content_id: String,
    pub is_inline: bool,
    pub size: u32,
    pub content: Option<Vec<u8>>,
}

/// Result of parsing one raw RFC 5322 message. Total-function output:
/// malformed input degrades to best-effort plain text.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedBody {
    pub body_text: String,
    pub body_html: String,
    pub has_attachments: bool,
    pub attachments: Vec<ParsedAttachment>,
    pub smime_raw: String,
    pub smime_encrypted: bool,
    pub pgp_raw: String,
    pub pgp_encrypted: bool,
    pub read_receipt_to: String,
}

/// Reentrant MIME parser. Verifiers are optional: without them, signed
/// `application/pkcs7-mime` bodies keep their raw bytes but yield no text.
#[derive(Clone, Default)]
pub struct BodyParser {
    smime: Option<Arc<dyn SmimeVerifier>>,
    pgp: Option<Arc<dyn PgpVerifier>>,
}

impl BodyParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verifiers(
        smime: Option<Arc<dyn SmimeVerifier>>,
        pgp: Option<Arc<dyn PgpVerifier>>,
    ) -> Self {
        Self { smime, pgp }
    }

    /// Parses a raw message. Any byte slice parses; a slice that is not a
    /// message at all degrades to the fallback extraction.
    pub fn parse(&self, raw: &[u8]) -> ParsedBody {
        let raw = if raw.len() > MAX_RAW_MESSAGE_SIZE {
            warn!(
                "raw message of {} bytes exceeds the {} byte cap, truncating",
                raw.len(),
                MAX_RAW_MESSAGE_SIZE
            );
            &raw[..MAX_RAW_MESSAGE_SIZE]
        } else {
            raw
        };

        let message = match MessageParser::default().parse(raw) {
            Some(message) if !message.parts.is_empty() => message,
            _ => {
                return ParsedBody {
                    body_text: fallback_extract(raw),
                    ..Default::default()
                }
            }
        };

        let mut parsed = ParsedBody {
            read_receipt_to: header_text(&message, "disposition-notification-to")
                .unwrap_or_default(),
            ..Default::default()
        };

        let envelope = message.parts[0]
            .content_type()
            .map(classify_envelope)
            .unwrap_or(SecureEnvelope::None);

        match envelope {
            SecureEnvelope::SmimeEncrypted => {
                parsed.smime_raw = String::from_utf8_lossy(raw).into_owned();
                parsed.smime_encrypted = true;
            }
            SecureEnvelope::PgpEncrypted => {
                parsed.pgp_raw = String::from_utf8_lossy(raw).into_owned();
                parsed.pgp_encrypted = true;
            }
            SecureEnvelope::SmimeSigned => {
                parsed.smime_raw = String::from_utf8_lossy(raw).into_owned();
                self.walk_signed_inner(&message, &mut parsed, self.smime.as_deref(), raw);
            }
            SecureEnvelope::PgpSigned => {
                parsed.pgp_raw = String::from_utf8_lossy(raw).into_owned();
                self.walk_signed_inner(&message, &mut parsed, None, raw);
            }
            SecureEnvelope::None => {
                walk_parts(&message, 0, 0, &mut parsed);
            }
        }

        if parsed.body_text.is_empty()
            && parsed.body_html.is_empty()
            && !parsed.smime_encrypted
            && !parsed.pgp_encrypted
            && parsed.attachments.is_empty()
            && !parsed.has_attachments
        {
            parsed.body_text = fallback_extract(raw);
        }

        parsed
    }

    /// Parses under the soft deadline. The inner task delivers through the
    /// join handle, so an overrun does not leak; its result is simply
    /// dropped and the fallback extraction is returned.
    pub async fn parse_with_deadline(&self, raw: Arc<Vec<u8>>) -> ParsedBody {
        let parser = self.clone();
        let task_raw = Arc::clone(&raw);
        let handle = tokio::task::spawn_blocking(move || parser.parse(&task_raw));
        match tokio::time::timeout(PARSE_DEADLINE, handle).await {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(join_err)) => {
                warn!("body parse task failed: {join_err}");
                ParsedBody {
                    body_text: fallback_extract(&raw),
                    ..Default::default()
                }
            }
            Err(_) => {
                warn!(
                    "body parse exceeded the {}s deadline, using fallback extraction",
                    PARSE_DEADLINE.as_secs()
                );
                ParsedBody {
                    body_text: fallback_extract(&raw),
                    ..Default::default()
                }
            }
        }
    }

    /// For signed envelopes the inner body is re-parsed for text; the
    /// verification status itself is never cached here.
    fn walk_signed_inner(
        &self,
        message: &Message<'_>,
        parsed: &mut ParsedBody,
        verifier: Option<&dyn SmimeVerifier>,
        raw: &[u8],
    ) {
        if let PartType::Multipart(children) = &message.parts[0].body {
            // multipart/signed: the first part is the signed content
            if let Some(&inner) = children.first() {
                walk_parts(message, inner, 0, parsed);
                return;
            }
        }
        // application/pkcs7-mime signed-data wraps the content in CMS;
        // only the host's verifier can unwrap it
        if let Some(verifier) = verifier {
            match verifier.verify_and_unwrap(raw) {
                Ok((_, Some(inner))) => {
                    if let Some(inner_message) = MessageParser::default().parse(inner.as_slice()) {
                        if !inner_message.parts.is_empty() {
                            walk_parts(&inner_message, 0, 0, parsed);
                        }
                    }
                }
                Ok((_, None)) => {}
                Err(e) => debug!("signed envelope unwrap failed: {e}"),
            }
        }
    }

    /// PGP verifier accessor for on-view consumers embedding the parser.
    pub fn pgp_verifier(&self) -> Option<&Arc<dyn PgpVerifier>> {
        self.pgp.as_ref()
    }
}

fn walk_parts(message: &Message<'_>, part_id: u32, depth: u8, parsed: &mut ParsedBody) {
    if depth > 16 {
        return;
    }
    let Some(part) = message.parts.get(part_id as usize) else {
        return;
    };

    match &part.body {
        PartType::Multipart(children) => {
            for &child in children {
                // guard against self-referential part tables
                if child != part_id {
                    walk_parts(message, child, depth + 1, parsed);
                }
            }
            return;
        }
        PartType::Message(nested) => {
            if !nested.parts.is_empty() {
                walk_nested(nested, parsed, depth);
            }
            return;
        }
        _ => {}
    }

    let ctype = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        })
        .unwrap_or_else(|| "text/plain".to_string());
    let content_id = part
        .content_id()
        .map(|cid| cid.trim_matches(|c| c == '<' || c == '>').to_string())
        .unwrap_or_default();
    let disposition = part.content_disposition();
    let is_attachment_disposition = disposition
        .map(|cd| cd.ctype().eq_ignore_ascii_case("attachment"))
        .unwrap_or(false);
    let is_inline_disposition = disposition
        .map(|cd| cd.ctype().eq_ignore_ascii_case("inline"))
        .unwrap_or(false);

    if is_attachment_disposition {
        let is_inline = !content_id.is_empty();
        let size = part.contents().len();
        parsed.attachments.push(ParsedAttachment {
            filename: part.attachment_name().unwrap_or("").to_string(),
            content_type: ctype,
            content_id,
            is_inline,
            size: size as u32,
            content: None,
        });
        if !is_inline {
            parsed.has_attachments = true;
        }
        return;
    }

    if ctype.starts_with("image/") && (!content_id.is_empty() || is_inline_disposition) {
        let contents = part.contents();
        let content = if contents.len() <= MAX_INLINE_CONTENT_SIZE {
            Some(contents.to_vec())
        } else {
            debug!(
                "inline image of {} bytes exceeds the {} byte cap, keeping metadata only",
                contents.len(),
                MAX_INLINE_CONTENT_SIZE
            );
            None
        };
        parsed.attachments.push(ParsedAttachment {
            filename: part.attachment_name().unwrap_or("").to_string(),
            content_type: ctype,
            content_id,
            is_inline: true,
            size: part.contents().len() as u32,
            content,
        });
        return;
    }

    match ctype.as_str() {
        "text/plain" => {
            if parsed.body_text.is_empty() {
                parsed.body_text = decode_part_text(message, part_id, false);
            }
        }
        "text/html" => {
            if parsed.body_html.is_empty() {
                parsed.body_html = decode_part_text(message, part_id, true);
            }
        }
        other if other.starts_with("text/") => {
            // calendar invites and the like; adopt as text of last resort
            if parsed.body_text.is_empty() {
                parsed.body_text = decode_part_text(message, part_id, false);
            }
        }
        _ => {
            parsed.has_attachments = true;
            let filename = part.attachment_name().unwrap_or("").to_string();
            if !filename.is_empty() || !content_id.is_empty() {
                parsed.attachments.push(ParsedAttachment {
                    filename,
                    content_type: ctype,
                    content_id,
                    is_inline: false,
                    size: part.contents().len() as u32,
                    content: None,
                });
            }
        }
    }
}

fn walk_nested(nested: &Message<'_>, parsed: &mut ParsedBody, depth: u8) {
    walk_parts(nested, 0, depth + 1, parsed);
}

/// Decodes one text part from its raw transfer-encoded bytes so charset
/// recovery sees the original octets, then runs the quoted-printable
/// safety net.
fn decode_part_text(message: &Message<'_>, part_id: u32, is_html: bool) -> String {
    let part = &message.parts[part_id as usize];
    let raw = raw_part_slice(message, part_id);
    let bytes = transfer_decode(raw, part.encoding);

    let declared = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(str::to_owned);

    let text = charset::decode_text(&bytes, declared.as_deref(), is_html);
    qp_safety_net(text)
}

fn raw_part_slice<'a>(message: &'a Message<'_>, part_id: u32) -> &'a [u8] {
    let part = &message.parts[part_id as usize];
    let raw = message.raw_message.as_ref();
    let start = (part.offset_body as usize).min(raw.len());
    let end = (part.offset_end as usize).min(raw.len()).max(start);
    let slice = &raw[start..end];
    if slice.len() > MAX_PART_SIZE {
        debug!(
            "part of {} bytes exceeds the {} byte cap, truncating",
            slice.len(),
            MAX_PART_SIZE
        );
        &slice[..MAX_PART_SIZE]
    } else {
        slice
    }
}

/// Transfer decoding with the partial-data policy: a decode error keeps
/// whatever bytes were produced, or the raw input when nothing was.
fn transfer_decode(raw: &[u8], encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::None => raw.to_vec(),
        Encoding::QuotedPrintable => {
            match quoted_printable::decode(raw, quoted_printable::ParseMode::Robust) {
                Ok(decoded) => decoded,
                Err(_) => raw.to_vec(),
            }
        }
        Encoding::Base64 => {
            let filtered: Vec<u8> = raw
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            match STANDARD.decode(&filtered) {
                Ok(decoded) => decoded,
                Err(_) => {
                    // salvage whole quanta from a truncated or damaged body
                    let whole = filtered.len() - filtered.len() % 4;
                    STANDARD
                        .decode(&filtered[..whole])
                        .unwrap_or_else(|_| raw.to_vec())
                }
            }
        }
    }
}

/// A decoded body still carrying `=3D` or soft line breaks went through a
/// quoted-printable layer the transfer decoding did not see; decode once
/// more, discarding the attempt on error.
fn qp_safety_net(text: String) -> String {
    if !(text.contains("=3D") || text.contains("=\n") || text.contains("=\r\n")) {
        return text;
    }
    match quoted_printable::decode(text.as_bytes(), quoted_printable::ParseMode::Strict) {
        Ok(decoded) => String::from_utf8(decoded).unwrap_or(text),
        Err(_) => text,
    }
}

/// Best-effort extraction for input that did not parse as a message:
/// printable ASCII (plus tab and newline) after the first blank line,
/// capped and marked when truncated.
pub fn fallback_extract(raw: &[u8]) -> String {
    let start = find_header_end(raw).unwrap_or(0);
    let mut out = String::with_capacity(MAX_FALLBACK_TEXT.min(raw.len() - start));
    let mut capped = false;
    for &b in &raw[start..] {
        if out.len() >= MAX_FALLBACK_TEXT {
            capped = true;
            break;
        }
        if b == b'\n' || b == b'\t' || (0x20..=0x7E).contains(&b) {
            out.push(b as char);
        }
    }
    let trimmed = out.trim();
    if capped {
        format!("{}{}", trimmed, FALLBACK_TRUNCATION_MARKER)
    } else {
        trimmed.to_string()
    }
}

/// Case-insensitive lookup of a non-standard header's text value.
pub(crate) fn header_text(message: &Message<'_>, key: &str) -> Option<String> {
    message
        .headers()
        .iter()
        .find(|header| header.name().to_lowercase() == key.to_lowercase())
        .and_then(|header| header.value().as_text().map(|s| s.trim().to_string()))
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
