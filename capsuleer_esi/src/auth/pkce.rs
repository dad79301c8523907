use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

#[derive(Clone, Debug)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

/// S256 verifier/challenge pair as EVE SSO expects it.
pub fn generate_pkce_pair() -> PkcePair {
    let mut raw = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let code_verifier = URL_SAFE_NO_PAD.encode(raw);
    let code_challenge = challenge_for(&code_verifier);

    PkcePair {
        code_verifier,
        code_challenge,
    }
}

pub fn generate_state() -> String {
    let mut raw = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

fn challenge_for(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
