use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random URL-safe invite code built from `byte_len` bytes of OS entropy.
pub(crate) fn generate_invite_code(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn join_url(public_base_url: &str, invite_code: &str) -> String {
    format!("{}/join/{}", public_base_url.trim_end_matches('/'), invite_code)
}
