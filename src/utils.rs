use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use regex::Regex;

use crate::errors::*;

lazy_static! {
    // RFC 2449 greeting: "+OK" [resp-code] text, with an optional <timestamp>
    static ref APOP_TIMESTAMP: Regex =
        Regex::new(r"^\+OK *(?:\[[^\]]+\])?[^<]*(<[^>]*>)?[^<]*$").unwrap();
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Extracts the `<...>` timestamp APOP needs from a server greeting.
pub fn apop_timestamp(greeting: &str) -> Option<&str> {
    APOP_TIMESTAMP
        .captures(greeting)
        .and_then(|cap| cap.get(1))
        .map(|timestamp| timestamp.as_str())
}

pub fn get_apop_digest(timestamp: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

fn hmac_md5(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Md5>::new_from_slice(key).map_err(|_| Error::from("Invalid CRAM-MD5 key"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Answers a CRAM-MD5 challenge: base64("user" SP hex(HMAC-MD5(password, nonce))).
pub fn cram_md5_response(username: &str, password: &str, b64_nonce: &str) -> Result<String> {
    let nonce = STANDARD
        .decode(b64_nonce.trim())
        .chain_err(|| "Invalid CRAM-MD5 challenge")?;
    let digest = hmac_md5(password.as_bytes(), &nonce)?;
    let plain = format!("{} {}", username, to_hex(&digest));
    Ok(STANDARD.encode(plain.as_bytes()))
}

/// The SASL PLAIN initial response: base64("\0user\0password").
pub fn auth_plain_argument(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\u{0}{}\u{0}{}", username, password).as_bytes())
}

pub fn auth_external_argument(username: &str) -> String {
    STANDARD.encode(username.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apop_digest_matches_rfc_1939_example() {
        assert_eq!(
            get_apop_digest("<1896.697170952@dbc.mtview.ca.us>", "tanstaaf"),
            "c4c9334bac560ecc979e58001b3e22fb"
        );
    }

    #[test]
    fn apop_timestamp_from_greeting() {
        assert_eq!(apop_timestamp("+OK abc<a>abcd"), Some("<a>"));
        assert_eq!(
            apop_timestamp("+OK [IN-USE] POP3 ready <1896.697170952@dbc.mtview.ca.us>"),
            Some("<1896.697170952@dbc.mtview.ca.us>")
        );
        assert_eq!(apop_timestamp("+OK POP3 server ready"), None);
    }

    #[test]
    fn cram_md5_known_answer() {
        assert_eq!(
            cram_md5_response("user", "password", "abcd").unwrap(),
            "dXNlciBhZGFhZTU2Zjk1NzAxZjQwNDQwZjhhMWU2YzY1ZjZmZg=="
        );
    }

    #[test]
    fn cram_md5_rejects_garbage_challenge() {
        assert!(cram_md5_response("user", "password", "not base64!").is_err());
    }

    #[test]
    fn hmac_md5_rfc_2104_vector() {
        let digest = hmac_md5(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(to_hex(&digest), "750c783e6ab0b503eaa86e310a5db738");
    }

    #[test]
    fn hmac_md5_hashes_keys_longer_than_a_block() {
        let digest = hmac_md5(&[0xaa; 80], b"Test Using Larger Than Block-Size Key - Hash Key First").unwrap();
        assert_eq!(to_hex(&digest), "6b1ab7fe4bd7bf8f0b62e6ce61b9d0cd");
    }

    #[test]
    fn plain_and_external_arguments() {
        assert_eq!(auth_plain_argument("user", "password"), "AHVzZXIAcGFzc3dvcmQ=");
        assert_eq!(auth_external_argument("user"), "dXNlcg==");
    }
}
