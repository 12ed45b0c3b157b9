//! AWS Signature Version 4 for S3 GET requests with static credentials.

use crate::error::MirrorError;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::SystemTime;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// Long-lived key pair plus the region requests are scoped to.
#[derive(Clone)]
pub(crate) struct Credentials {
    pub key_id: String,
    pub secret_key: String,
    pub region: String,
}

/// Percent-encodes per the SigV4 rules: everything except `A-Z a-z 0-9 - _ . ~`
/// is escaped, `/` only when `encode_slash` is set.
pub(crate) fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Canonical (sorted, encoded) query string; also used verbatim on the wire.
pub(crate) fn canonical_query(pairs: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>, MirrorError> {
    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key)
        .map_err(|e| MirrorError::Store(format!("signing key rejected: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes the headers that authenticate a body-less request.
///
/// `canonical_uri` must already be encoded with [`uri_encode`] and
/// `query` must be the output of [`canonical_query`].
pub(crate) fn sign_request(
    credentials: &Credentials,
    method: &str,
    host: &str,
    canonical_uri: &str,
    query: &str,
    now: SystemTime,
) -> Result<Vec<(&'static str, String)>, MirrorError> {
    // 2013-05-24T00:00:00Z -> 20130524T000000Z
    let amz_date: String = humantime::format_rfc3339_seconds(now)
        .to_string()
        .chars()
        .filter(|c| *c != '-' && *c != ':')
        .collect();
    let date_stamp = &amz_date[..8];
    let payload_hash = format!("{:x}", Sha256::digest(b""));

    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        method, canonical_uri, query, host, payload_hash, amz_date, SIGNED_HEADERS, payload_hash
    );
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, credentials.region, SERVICE
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{:x}",
        ALGORITHM,
        amz_date,
        scope,
        Sha256::digest(canonical_request.as_bytes())
    );

    let k_date = hmac(
        format!("AWS4{}", credentials.secret_key).as_bytes(),
        date_stamp,
    )?;
    let k_region = hmac(&k_date, &credentials.region)?;
    let k_service = hmac(&k_region, SERVICE)?;
    let k_signing = hmac(&k_service, "aws4_request")?;
    let signature: String = hmac(&k_signing, &string_to_sign)?
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.key_id, scope, SIGNED_HEADERS, signature
    );

    Ok(vec![
        ("x-amz-date", amz_date),
        ("x-amz-content-sha256", payload_hash),
        ("authorization", authorization),
    ])
}
