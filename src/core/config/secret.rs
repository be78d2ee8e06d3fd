use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Signing key used when `SECRET_KEY` is unset outside strict mode.
///
/// Tokens signed with it do not survive a restart.
pub(super) fn ephemeral_secret_key() -> String {
    tracing::warn!("SECRET_KEY is not set; generated an ephemeral signing key");
    generate_secret_key()
}

fn generate_secret_key() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
