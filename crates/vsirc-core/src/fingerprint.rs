//! Event fingerprints: the SHA-256 identity shared by all responders.

use std::fmt::{self, Write as _};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Byte length of an [`EventFingerprint`].
pub const FINGERPRINT_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Enumerates supported `FingerprintError` values.
pub enum FingerprintError {
    #[error("fingerprint must be {FINGERPRINT_LEN} bytes, got {0}")]
    InvalidLength(usize),
    #[error("fingerprint hex must have an even number of digits, got {0}")]
    OddHexLength(usize),
    #[error("invalid hex digit '{0}' in fingerprint")]
    InvalidHexDigit(char),
}

/// Opaque identity of an event for arbitration purposes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventFingerprint([u8; FINGERPRINT_LEN]);

impl EventFingerprint {
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Fingerprint of a witness submission: `SHA256(user ‖ 0x00 ‖ payload)`.
    pub fn for_submission(origin_user: &str, payload: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(origin_user.as_bytes());
        hasher.update([0u8]);
        hasher.update(payload.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FingerprintError> {
        let array: [u8; FINGERPRINT_LEN] = bytes
            .try_into()
            .map_err(|_| FingerprintError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Parses hex in either case; the chat surface always renders uppercase.
    pub fn from_hex(hex: &str) -> Result<Self, FingerprintError> {
        let digits = hex.as_bytes();
        if digits.len() % 2 != 0 {
            return Err(FingerprintError::OddHexLength(digits.len()));
        }
        let mut bytes = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks_exact(2) {
            let high = hex_value(pair[0])?;
            let low = hex_value(pair[1])?;
            bytes.push((high << 4) | low);
        }
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Uppercase hex rendering used in chat replies.
    pub fn to_hex(&self) -> String {
        let mut output = String::with_capacity(FINGERPRINT_LEN * 2);
        for byte in self.0 {
            let _ = write!(&mut output, "{byte:02X}");
        }
        output
    }
}

fn hex_value(digit: u8) -> Result<u8, FingerprintError> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(FingerprintError::InvalidHexDigit(char::from(other))),
    }
}

impl fmt::Display for EventFingerprint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EventFingerprint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "EventFingerprint({})", self.to_hex())
    }
}
