//! PKCE S256 parameter generation
//!
//! This module implements the Proof Key for Code Exchange (PKCE) extension
//! to OAuth 2.0 as defined in RFC 7636, using the `S256` challenge method.
//!
//! # How PKCE works
//!
//! 1. The client generates a high-entropy random string called the `code_verifier`.
//! 2. The client computes a SHA-256 hash of the verifier and base64url-encodes
//!    it to produce the `code_challenge`.
//! 3. The authorization request includes `code_challenge` and
//!    `code_challenge_method=S256`.
//! 4. The token exchange request includes the original `code_verifier`.
//! 5. The identity provider recomputes the challenge and compares it to
//!    the value sent in step 3, proving possession of the verifier.
//!
//! Alongside the verifier, every login attempt gets a fresh random `state`
//! value that the callback listener checks to reject forged redirects.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};

/// Number of random bytes behind the `state` value.
pub const STATE_BYTES: usize = 16;

/// Number of random bytes behind the `code_verifier` value.
///
/// 64 bytes encode to 86 base64url characters, inside the 43..=128 range
/// RFC 7636 allows.
pub const VERIFIER_BYTES: usize = 64;

/// The only challenge method this crate emits.
pub const CHALLENGE_METHOD: &str = "S256";

// ---------------------------------------------------------------------------
// PkceParams
// ---------------------------------------------------------------------------

/// Per-attempt PKCE parameters: anti-forgery `state`, the `code_verifier`
/// and its derived `code_challenge`.
///
/// Values are created once by [`generate`] and used for exactly one login
/// attempt. The `Debug` implementation redacts the secrets so the struct can
/// never leak them through logging.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::pkce::{challenge_for, generate};
///
/// let params = generate();
/// assert_eq!(params.code_challenge, challenge_for(&params.code_verifier));
/// assert_ne!(params.code_challenge, params.code_verifier);
/// ```
#[derive(Clone)]
pub struct PkceParams {
    /// Opaque value echoed back by the identity provider on the callback.
    pub state: String,

    /// Base64url (no padding) encoding of [`VERIFIER_BYTES`] random bytes.
    /// Sent only to the token endpoint.
    pub code_verifier: String,

    /// `base64url_nopad(SHA-256(code_verifier))`. Sent in the authorization
    /// URL.
    pub code_challenge: String,
}

impl fmt::Debug for PkceParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceParams")
            .field("state", &"<redacted>")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates fresh PKCE parameters for one login attempt.
///
/// Randomness comes from the thread-local CSPRNG seeded by the operating
/// system. If the OS entropy source is unavailable `rand` panics; the
/// process cannot continue without secure randomness.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::pkce::generate;
///
/// let a = generate();
/// let b = generate();
/// assert_ne!(a.state, b.state);
/// assert_ne!(a.code_verifier, b.code_verifier);
/// assert_eq!(a.code_verifier.len(), 86);
/// ```
pub fn generate() -> PkceParams {
    let state = random_token(STATE_BYTES);
    let code_verifier = random_token(VERIFIER_BYTES);
    let code_challenge = challenge_for(&code_verifier);

    PkceParams {
        state,
        code_verifier,
        code_challenge,
    }
}

/// Computes the S256 challenge for a verifier.
///
/// RFC 7636 section 4.2: `BASE64URL(SHA256(ASCII(code_verifier)))`.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::pkce::challenge_for;
///
/// assert_eq!(
///     challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
///     "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
/// );
/// ```
pub fn challenge_for(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest.as_slice())
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
