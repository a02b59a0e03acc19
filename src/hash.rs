use std::fmt;
use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Digest returned for absent content. Real digests are always 32 hex characters,
/// so the sentinel never collides with one.
pub const NULL_DIGEST: &str = "0";

const DIGEST_BYTES: usize = 16;

/// Lowercase hex digest used as a restart-stable identity fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexDigest(String);

impl HexDigest {
  /// Accepts a digest that came back from the wire (the tail of callback data).
  pub fn parse(raw: &str) -> Option<Self> {
    if raw == NULL_DIGEST {
      return Some(Self(NULL_DIGEST.to_string()));
    }
    let valid = raw.len() == DIGEST_BYTES * 2 && raw.bytes().all(|b| matches!(b, b'0' ..= b'9' | b'a' ..= b'f'));
    valid.then(|| Self(raw.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_null(&self) -> bool {
    self.0 == NULL_DIGEST
  }
}

impl fmt::Display for HexDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// SHA-256 of the UTF-8 content truncated to 128 bits. Callback data stays well under
/// Telegram's 64 byte limit with the default prefix.
pub fn content_hash(content: Option<&str>) -> HexDigest {
  match content {
    None => HexDigest(NULL_DIGEST.to_string()),
    Some(text) => digest(text.as_bytes()),
  }
}

/// Hashes the concatenation of `parts`.
pub fn hash_parts<I, S>(parts: I) -> HexDigest
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut hasher = Sha256::new();
  for part in parts {
    hasher.update(part.as_ref().as_bytes());
  }
  encode(&hasher.finalize()[.. DIGEST_BYTES])
}

fn digest(bytes: &[u8]) -> HexDigest {
  let full = Sha256::digest(bytes);
  encode(&full[.. DIGEST_BYTES])
}

fn encode(bytes: &[u8]) -> HexDigest {
  let mut out = String::with_capacity(bytes.len() * 2);
  for byte in bytes {
    let _ = write!(out, "{byte:02x}");
  }
  HexDigest(out)
}
