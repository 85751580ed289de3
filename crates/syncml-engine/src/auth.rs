//! Credential encoding for the session authentication sub-protocol.
//!
//! Basic is `base64(user ":" pass)`. MD5 is
//! `MD5( base64( MD5(user ":" pass) ) ":" nonce )`, base64-encoded when it
//! travels in a `b64`-format Cred. The nesting order is mandated by the
//! interop spec; both sides apply base64 around the inner hash before the
//! colon.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest, Md5};

fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Basic credentials: `base64(user ":" pass)`.
pub fn encode_basic_auth(username: &str, password: &str) -> String {
    BASE64.encode(format!("{username}:{password}"))
}

/// Decode basic credentials back into `(user, pass)`.
pub fn decode_basic_auth(data: &str) -> Option<(String, String)> {
    let decoded = BASE64.decode(data.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Raw MD5 digest of the credentials against a nonce.
pub fn encode_md5_auth(username: &str, password: &str, nonce: &[u8]) -> [u8; 16] {
    let inner = md5(format!("{username}:{password}").as_bytes());
    let mut outer = BASE64.encode(inner).into_bytes();
    outer.push(b':');
    outer.extend_from_slice(nonce);
    md5(&outer)
}

/// MD5 credentials as they travel in a `b64`-format Cred element.
pub fn encode_md5_auth_b64(username: &str, password: &str, nonce: &[u8]) -> String {
    BASE64.encode(encode_md5_auth(username, password, nonce))
}

/// Verify is encode-and-compare.
pub fn verify_md5_auth(username: &str, password: &str, nonce: &[u8], presented: &str) -> bool {
    encode_md5_auth_b64(username, password, nonce) == presented.trim()
}

pub fn verify_basic_auth(username: &str, password: &str, presented: &str) -> bool {
    encode_basic_auth(username, password) == presented.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_encoding_round_trip() {
        let encoded = encode_basic_auth("alice", "s3cret");
        assert_eq!(encoded, "YWxpY2U6czNjcmV0");
        assert_eq!(decode_basic_auth(&encoded), Some(("alice".into(), "s3cret".into())));
    }

    #[test]
    fn basic_decoding_rejects_garbage() {
        assert!(decode_basic_auth("!!notbase64!!").is_none());
        assert!(decode_basic_auth(&BASE64.encode("no-colon")).is_none());
    }

    #[test]
    fn password_may_contain_colon() {
        let encoded = encode_basic_auth("bob", "a:b:c");
        assert_eq!(decode_basic_auth(&encoded), Some(("bob".into(), "a:b:c".into())));
    }

    #[test]
    fn md5_nesting_law() {
        // encode(u, p, n) == MD5( B64( MD5(u ":" p) ) ":" n ), byte for byte.
        let nonce = b"Nonce";
        let digest = encode_md5_auth("alice", "s3cret", nonce);

        let inner = md5(b"alice:s3cret");
        let mut expected_input = BASE64.encode(inner).into_bytes();
        expected_input.push(b':');
        expected_input.extend_from_slice(nonce);
        assert_eq!(digest, md5(&expected_input));
    }

    #[test]
    fn md5_verify_round_trip() {
        let nonce = b"Tm9uY2U=-decoded";
        let wire = encode_md5_auth_b64("alice", "s3cret", nonce);
        assert!(verify_md5_auth("alice", "s3cret", nonce, &wire));
        assert!(!verify_md5_auth("alice", "wrong", nonce, &wire));
        assert!(!verify_md5_auth("alice", "s3cret", b"other", &wire));
    }

    #[test]
    fn md5_depends_on_nonce() {
        let a = encode_md5_auth_b64("u", "p", b"n1");
        let b = encode_md5_auth_b64("u", "p", b"n2");
        assert_ne!(a, b);
    }
}
