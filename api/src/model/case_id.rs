use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 12-byte record identifier, written as 24 lowercase hex characters.
///
/// The first four bytes hold the creation time in seconds (big-endian), the
/// remaining eight are random, so ids sort roughly by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseId([u8; 12]);

#[derive(Debug, Clone, PartialEq)]
pub enum CaseIdError {
    InvalidHex(String),
    InvalidLength(usize),
}

impl fmt::Display for CaseIdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CaseIdError::InvalidHex(value) => write!(f, "Invalid case id hex: {}", value),
            CaseIdError::InvalidLength(len) => {
                write!(f, "Case id must be 12 bytes, got {} bytes", len)
            }
        }
    }
}

impl std::error::Error for CaseIdError {}

impl CaseId {
    pub fn new() -> Self {
        let seconds = chrono::Utc::now().timestamp() as u32;
        let random = uuid::Uuid::new_v4();
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..8]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for CaseId {
    type Err = CaseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s.trim()).map_err(|_| CaseIdError::InvalidHex(s.to_string()))?;
        let bytes: [u8; 12] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| CaseIdError::InvalidLength(decoded.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for CaseId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CaseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
