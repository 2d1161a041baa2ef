//! Ed25519 public keys, signatures and blockhashes as used by the ledger.
//!
//! All three are fixed-size byte arrays whose text form is base58, which is
//! how wallets, explorers and the JSON-RPC interface print them.

use std::{fmt, str::FromStr};

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of a public key in bytes.
pub const PUBKEY_SIZE: usize = 32;

/// Size of an ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Errors produced when parsing the base58 text form of a key or hash.
#[derive(Debug, thiserror::Error)]
pub enum ParsePubkeyError {
    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    WrongSize { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParsePubkeyError> {
    let bytes = bs58::decode(s.trim()).into_vec()?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ParsePubkeyError::WrongSize {
            expected: N,
            actual: bytes.len(),
        })
}

/// An account address or wallet identity on the ledger.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_SIZE]);

impl Pubkey {
    pub const fn new_from_array(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; PUBKEY_SIZE] {
        self.0
    }

    /// Returns true if the bytes decompress to a point on the ed25519 curve.
    ///
    /// Program derived addresses are required to be off the curve so that no
    /// private key can exist for them.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Short prefix of the base58 form, for log lines.
    pub fn fmt_short(&self) -> String {
        let full = self.to_string();
        full.chars().take(8).collect()
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; PUBKEY_SIZE]> for Pubkey {
    fn from(value: [u8; PUBKEY_SIZE]) -> Self {
        Self(value)
    }
}

impl From<Pubkey> for [u8; PUBKEY_SIZE] {
    fn from(value: Pubkey) -> Self {
        value.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pubkey").field(&self.to_string()).finish()
    }
}

impl FromStr for Pubkey {
    type Err = ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Self)
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An ed25519 signature over a serialized transaction message.
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub const fn new_from_array(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Verifies this signature against `message` for the given signer.
    pub fn verify(&self, pubkey: &Pubkey, message: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(pubkey.as_bytes()) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&self.0);
        key.verify(message, &signature).is_ok()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_SIZE])
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature").field(&self.to_string()).finish()
    }
}

impl FromStr for Signature {
    type Err = ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Self)
    }
}

/// Recent blockhash a transaction message is bound to.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct Blockhash([u8; 32]);

impl Blockhash {
    /// Blockhash used for messages that are signed but never submitted.
    pub const ZERO: Blockhash = Blockhash([0u8; 32]);

    pub const fn new_from_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Blockhash").field(&self.to_string()).finish()
    }
}

impl FromStr for Blockhash {
    type Err = ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Self)
    }
}

/// The native system program, owner of plain wallet accounts.
pub mod system_program {
    use super::Pubkey;

    /// `11111111111111111111111111111111`
    pub const ID: Pubkey = Pubkey::new_from_array([0u8; 32]);
}

/// Address of the deployed Soldrive program:
/// `5QEzcF7HPx6z3oN4Fu8cqxGr99oUEGS4uE4MrazyjstF`.
pub const SOLDRIVE_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    65, 98, 237, 179, 51, 70, 203, 235, 61, 210, 19, 170, 81, 122, 254, 214, 56, 247, 90, 210,
    178, 39, 217, 125, 83, 23, 126, 186, 179, 152, 138, 20,
]);
