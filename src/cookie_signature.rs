//! Signed session cookie values
//!
//! Cookie values use the express-session layout `s:<id>.<mac>`, where `<mac>`
//! is the unpadded standard base64 of HMAC-SHA256 over `<id>`. Node apps using
//! `cookie-signature` with the same secret accept these cookies and vice versa.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "s:";

/// Signs with the first secret and verifies against all of them
#[derive(Clone, Debug)]
pub struct CookieSigner {
    secrets: Vec<String>,
}

impl CookieSigner {
    /// Secrets in order of preference; the first one signs new cookies.
    pub fn new(secrets: Vec<String>) -> Self {
        Self { secrets }
    }

    /// Produce `s:<value>.<mac>`, or `None` when no secret is configured.
    pub fn sign(&self, value: &str) -> Option<String> {
        let secret = self.secrets.first()?;
        let tag = STANDARD_NO_PAD.encode(mac(secret, value).finalize().into_bytes());
        Some(format!("{}{}.{}", PREFIX, value, tag))
    }

    /// Recover the value from a signed cookie if any secret verifies it.
    pub fn unsign(&self, signed: &str) -> Option<String> {
        let (value, tag) = signed.strip_prefix(PREFIX)?.rsplit_once('.')?;
        let tag = STANDARD_NO_PAD.decode(tag).ok()?;
        self.secrets
            .iter()
            .any(|secret| mac(secret, value).verify_slice(&tag).is_ok())
            .then(|| value.to_string())
    }

    /// URL-decode a raw cookie value, then unsign it.
    pub fn unsign_cookie(&self, raw: &str) -> Option<String> {
        let decoded = urlencoding::decode(raw)
            .map(|d| d.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        self.unsign(&decoded)
    }
}

fn mac(secret: &str, value: &str) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(value.as_bytes());
    mac
}
