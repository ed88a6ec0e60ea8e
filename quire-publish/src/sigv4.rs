//! AWS Signature Version 4 for single-request S3 writes.
//!
//! Signing steps:
//!
//! 1. Canonical request: method, URI, query, sorted headers, signed header
//!    list, payload hash.
//! 2. String to sign: algorithm, timestamp, credential scope, hash of (1).
//! 3. Signing key: HMAC chain over date, region, service, `aws4_request`.
//! 4. Signature: hex HMAC of (2) under (3).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// Everything needed to sign one request. Header names must be lowercase.
#[derive(Debug)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub canonical_uri: &'a str,
    pub headers: Vec<(&'a str, String)>,
    pub payload_hash: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub timestamp: DateTime<Utc>,
}

pub fn amz_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn date_stamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d").to_string()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode everything except unreserved characters. `/` survives
/// when encoding a path.
pub fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

impl SigningRequest<'_> {
    fn sorted_headers(&self) -> Vec<(&str, String)> {
        let mut headers: Vec<(&str, String)> = self
            .headers
            .iter()
            .map(|(name, value)| (*name, value.trim().to_string()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        headers
    }

    pub fn signed_headers(&self) -> String {
        self.sorted_headers()
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            date_stamp(&self.timestamp),
            self.region,
            self.service
        )
    }

    pub fn canonical_request(&self) -> String {
        let canonical_headers: String = self
            .sorted_headers()
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();
        format!(
            "{}\n{}\n\n{}\n{}\n{}",
            self.method,
            self.canonical_uri,
            canonical_headers,
            self.signed_headers(),
            self.payload_hash
        )
    }

    pub fn string_to_sign(&self) -> String {
        format!(
            "{ALGORITHM}\n{}\n{}\n{}",
            amz_date(&self.timestamp),
            self.credential_scope(),
            sha256_hex(self.canonical_request().as_bytes())
        )
    }

    pub fn signature(&self) -> String {
        let key = signing_key(
            self.secret_key,
            &date_stamp(&self.timestamp),
            self.region,
            self.service,
        );
        hex::encode(hmac(&key, self.string_to_sign().as_bytes()))
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key,
            self.credential_scope(),
            self.signed_headers(),
            self.signature()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(timestamp: DateTime<Utc>) -> SigningRequest<'static> {
        SigningRequest {
            method: "PUT",
            canonical_uri: "/foo.com/index.html",
            headers: vec![
                ("x-amz-date", amz_date(&timestamp)),
                ("host", "s3.amazonaws.com".to_string()),
                ("x-amz-acl", "public-read".to_string()),
            ],
            payload_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            region: "us-east-1",
            service: "s3",
            access_key: "AKIDEXAMPLE",
            secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            timestamp,
        }
    }

    #[test]
    fn signing_key_matches_published_derivation() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn empty_payload_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn headers_are_sorted_and_listed() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).single().expect("timestamp");
        let req = request(ts);
        assert_eq!(req.signed_headers(), "host;x-amz-acl;x-amz-date");
        let canonical = req.canonical_request();
        assert!(canonical.starts_with("PUT\n/foo.com/index.html\n\nhost:s3.amazonaws.com\n"));
        assert!(canonical.contains("x-amz-date:20240301T123000Z\n"));
        assert_eq!(req.credential_scope(), "20240301/us-east-1/s3/aws4_request");
    }

    #[test]
    fn authorization_is_deterministic_and_time_bound() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).single().expect("timestamp");
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 12, 31, 0).single().expect("timestamp");
        let auth = request(ts).authorization();
        assert_eq!(auth, request(ts).authorization());
        assert_ne!(auth, request(later).authorization());
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-acl;x-amz-date, Signature="
        ));
    }

    #[test]
    fn uri_encoding() {
        assert_eq!(uri_encode("a b/c~d.html", true), "a%20b/c~d.html");
        assert_eq!(uri_encode("a/b", false), "a%2Fb");
        assert_eq!(uri_encode("ü", true), "%C3%BC");
    }
}
