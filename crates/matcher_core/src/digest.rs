use std::fmt;
use std::str::FromStr;

/// A 20-byte SHA-1 piece digest, as found verbatim in a torrent's `pieces` field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct PieceDigest(#[serde(with = "hex_bytes")] pub [u8; 20]);

impl PieceDigest {
    pub const LEN: usize = 20;

    pub fn from_slice(b: &[u8]) -> Option<Self> {
        if b.len() != Self::LEN {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(b);
        Some(Self(out))
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PieceDigest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 20];
        if s.len() != 40 {
            anyhow::bail!("expected a hex string of length 40, got {}", s.len());
        }
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Debug for PieceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl AsRef<[u8]> for PieceDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 20], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 20];
        hex::decode_to_slice(&s, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}

/// An opaque whole-file content hash, as recorded in the local file catalog.
///
/// The catalog's hashing algorithm is caller-defined (the core never computes
/// one); this is just the key used to address the piece-hash cache.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct WholeFileHash(pub String);

impl fmt::Debug for WholeFileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WholeFileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WholeFileHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WholeFileHash {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
