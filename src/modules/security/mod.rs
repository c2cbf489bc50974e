// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncResult;
use mail_parser::ContentType;
use serde::{Deserialize, Serialize};

/// Cryptographic envelope classification of a message's top-level
/// content type. Verification and decryption are on-view concerns; the
/// sync core only classifies and stages raw bytes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum SecureEnvelope {
    #[default]
    None,
    SmimeSigned,
    SmimeEncrypted,
    PgpSigned,
    PgpEncrypted,
}

pub fn classify_envelope(content_type: &ContentType) -> SecureEnvelope {
    if is_smime_encrypted(content_type) {
        SecureEnvelope::SmimeEncrypted
    } else if is_smime_signed(content_type) {
        SecureEnvelope::SmimeSigned
    } else if is_pgp_encrypted(content_type) {
        SecureEnvelope::PgpEncrypted
    } else if is_pgp_signed(content_type) {
        SecureEnvelope::PgpSigned
    } else {
        SecureEnvelope::None
    }
}

pub fn is_smime_signed(ct: &ContentType) -> bool {
    if ct_is(ct, "multipart", "signed") {
        return attr_eq(ct, "protocol", "application/pkcs7-signature")
            || attr_eq(ct, "protocol", "application/x-pkcs7-signature");
    }
    if ct_is(ct, "application", "pkcs7-mime") || ct_is(ct, "application", "x-pkcs7-mime") {
        return attr_eq(ct, "smime-type", "signed-data");
    }
    false
}

pub fn is_smime_encrypted(ct: &ContentType) -> bool {
    (ct_is(ct, "application", "pkcs7-mime") || ct_is(ct, "application", "x-pkcs7-mime"))
        && attr_eq(ct, "smime-type", "enveloped-data")
}

pub fn is_pgp_signed(ct: &ContentType) -> bool {
    ct_is(ct, "multipart", "signed") && attr_eq(ct, "protocol", "application/pgp-signature")
}

pub fn is_pgp_encrypted(ct: &ContentType) -> bool {
    ct_is(ct, "multipart", "encrypted") && attr_eq(ct, "protocol", "application/pgp-encrypted")
}

fn ct_is(ct: &ContentType, ctype: &str, subtype: &str) -> bool {
    ct.ctype().eq_ignore_ascii_case(ctype)
        && ct
            .subtype()
            .map(|s| s.eq_ignore_ascii_case(subtype))
            .unwrap_or(false)
}

fn attr_eq(ct: &ContentType, name: &str, value: &str) -> bool {
    ct.attribute(name)
        .map(|v| v.eq_ignore_ascii_case(value))
        .unwrap_or(false)
}

/// Outcome of a signature verification, reported by the host's verifier.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VerifyResult {
    pub valid: bool,
    pub signer: Option<String>,
}

/// S/MIME verifier supplied by the host. `verify_and_unwrap` returns the
/// inner MIME bytes for signed-data envelopes so text extraction can
/// continue without caching any verification status.
pub trait SmimeVerifier: Send + Sync {
    fn verify_and_unwrap(&self, raw: &[u8]) -> MailSyncResult<(VerifyResult, Option<Vec<u8>>)>;
}

/// PGP/MIME verifier supplied by the host.
pub trait PgpVerifier: Send + Sync {
    fn verify_and_unwrap(&self, raw: &[u8]) -> MailSyncResult<(VerifyResult, Option<Vec<u8>>)>;
}

/// HTML sanitizer supplied by the host; invoked on every parsed HTML body
/// before it is persisted.
pub trait HtmlSanitizer: Send + Sync {
    fn sanitize(&self, html: &str) -> String;
}

/// Pass-through sanitizer for hosts that sanitize at render time.
pub struct NoopSanitizer;

impl HtmlSanitizer for NoopSanitizer {
    fn sanitize(&self, html: &str) -> String {
        html.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::{MessageParser, MimeHeaders};

    fn root_content_type(raw: &'static [u8]) -> ContentType<'static> {
        // leak is fine in tests
        let message = MessageParser::default().parse(raw).unwrap();
        let message: &'static _ = Box::leak(Box::new(message));
        message.parts[0].content_type().unwrap().clone()
    }

    #[test]
    fn classifies_smime_enveloped_data() {
        let raw = b"Content-Type: application/pkcs7-mime; smime-type=enveloped-data; name=\"smime.p7m\"\r\n\r\nAAAA";
        let ct = root_content_type(raw);
        assert!(is_smime_encrypted(&ct));
        assert_eq!(classify_envelope(&ct), SecureEnvelope::SmimeEncrypted);
    }

    #[test]
    fn classifies_pgp_multipart_encrypted() {
        let raw = b"Content-Type: multipart/encrypted; protocol=\"application/pgp-encrypted\"; boundary=\"b\"\r\n\r\nbody";
        let ct = root_content_type(raw);
        assert!(is_pgp_encrypted(&ct));
        assert!(!is_pgp_signed(&ct));
    }

    #[test]
    fn classifies_signed_variants() {
        let smime = b"Content-Type: multipart/signed; protocol=\"application/pkcs7-signature\"; boundary=\"b\"\r\n\r\nbody";
        assert_eq!(
            classify_envelope(&root_content_type(smime)),
            SecureEnvelope::SmimeSigned
        );
        let pgp = b"Content-Type: multipart/signed; protocol=\"application/pgp-signature\"; boundary=\"b\"\r\n\r\nbody";
        assert_eq!(
            classify_envelope(&root_content_type(pgp)),
            SecureEnvelope::PgpSigned
        );
    }
}
