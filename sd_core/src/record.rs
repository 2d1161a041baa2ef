//! Decoded Soldrive records.
//!
//! Names and content are kept as opaque bytes here: at this layer they are
//! ciphertext produced by the client's encryption facade.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{error::ProgramError, pubkey::Pubkey};

/// Parent id of records that live at the top level.
pub const ROOT: u32 = 0;

/// Per-owner bookkeeping record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub created_at: i64,
    /// Last folder id handed out.
    pub folder_id: u32,
    /// Last file id handed out.
    pub file_id: u32,
    pub folder_count: u32,
    pub file_count: u32,
    /// Bytes of file capacity currently reserved.
    pub space_used: u32,
    pub encryption: bool,
}

impl User {
    /// Id the next created folder will receive.
    pub fn next_folder_id(&self) -> Result<u32, ProgramError> {
        self.folder_id
            .checked_add(1)
            .ok_or(ProgramError::FolderCountExceeded)
    }

    pub fn next_file_id(&self) -> Result<u32, ProgramError> {
        self.file_id.checked_add(1).ok_or(ProgramError::FileCountExceeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub owner: Pubkey,
    pub id: u32,
    pub created_at: i64,
    pub parent: u32,
    pub name: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub owner: Pubkey,
    pub id: u32,
    pub created_at: i64,
    pub parent: u32,
    pub name: Vec<u8>,
    pub file_ext: String,
    /// Size of the original payload as the user sees it.
    pub file_size: u64,
    pub access: Access,
    pub backend: Backend,
    /// Length of the stored content.
    pub size: u32,
    /// Capacity reserved at creation. Never grows.
    pub max_size: u32,
    /// Stored content, present only when requested.
    #[serde(skip)]
    pub content: Option<Bytes>,
}

impl File {
    /// Content bytes, or an empty slice when they were not fetched.
    pub fn content_bytes(&self) -> &[u8] {
        self.content.as_deref().unwrap_or_default()
    }

    /// Whether `len` bytes fit into the reserved capacity.
    pub fn fits(&self, len: usize) -> bool {
        len <= self.max_size as usize
    }
}

/// A record together with the address it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyed<T> {
    pub address: Pubkey,
    pub record: T,
}

impl<T> Keyed<T> {
    pub fn new(address: Pubkey, record: T) -> Self {
        Self { address, record }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Keyed<U> {
        Keyed {
            address: self.address,
            record: f(self.record),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseTagError {
    kind: &'static str,
    value: String,
}

/// Lower-cases the first character of a tag key, turning the program's
/// `PublicRead` form into the logical `publicRead`.
fn normalize_tag(s: &str) -> String {
    let mut chars = s.trim().chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Who may read and write a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
}

impl Access {
    pub const ALL: [Access; 3] = [Access::Private, Access::PublicRead, Access::PublicReadWrite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Private => "private",
            Access::PublicRead => "publicRead",
            Access::PublicReadWrite => "publicReadWrite",
        }
    }

    /// Only strictly private files are sealed with the owner's key.
    pub fn is_private(&self) -> bool {
        matches!(self, Access::Private)
    }

    pub(crate) fn index(&self) -> u8 {
        *self as u8
    }

    pub(crate) fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Access {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = normalize_tag(s);
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == tag)
            .ok_or(ParseTagError {
                kind: "access",
                value: s.to_string(),
            })
    }
}

/// Where a file's bytes physically live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    /// Content is stored in the file account itself.
    #[default]
    Solana,
    /// Content is stored on the external network; the account holds a link.
    Arweave,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Solana, Backend::Arweave];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Solana => "solana",
            Backend::Arweave => "arweave",
        }
    }

    pub fn is_on_ledger(&self) -> bool {
        matches!(self, Backend::Solana)
    }

    pub(crate) fn index(&self) -> u8 {
        *self as u8
    }

    pub(crate) fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = normalize_tag(s);
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == tag)
            .ok_or(ParseTagError {
                kind: "backend",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_keys_are_normalized() {
        assert_eq!("Private".parse::<Access>().unwrap(), Access::Private);
        assert_eq!("publicRead".parse::<Access>().unwrap(), Access::PublicRead);
        assert_eq!(
            "PublicReadWrite".parse::<Access>().unwrap(),
            Access::PublicReadWrite
        );
        assert_eq!("Arweave".parse::<Backend>().unwrap(), Backend::Arweave);
        assert!("shared".parse::<Access>().is_err());
        assert!("".parse::<Backend>().is_err());
    }

    #[test]
    fn logical_values_are_lower_camel_case() {
        assert_eq!(Access::PublicRead.to_string(), "publicRead");
        assert_eq!(
            serde_json::to_string(&Access::PublicReadWrite).unwrap(),
            "\"publicReadWrite\""
        );
        assert_eq!(serde_json::to_string(&Backend::Solana).unwrap(), "\"solana\"");
    }

    #[test]
    fn only_private_is_private() {
        assert!(Access::Private.is_private());
        assert!(!Access::PublicRead.is_private());
        assert!(!Access::PublicReadWrite.is_private());
    }

    #[test]
    fn next_ids_follow_last_assigned() {
        let user = User {
            folder_id: 3,
            file_id: 9,
            ..Default::default()
        };
        assert_eq!(user.next_folder_id(), Ok(4));
        assert_eq!(user.next_file_id(), Ok(10));
    }

    #[test]
    fn exhausted_counters_report_program_errors() {
        let user = User {
            folder_id: u32::MAX,
            file_id: u32::MAX,
            ..Default::default()
        };
        assert_eq!(
            user.next_folder_id(),
            Err(ProgramError::FolderCountExceeded)
        );
        assert_eq!(user.next_file_id(), Err(ProgramError::FileCountExceeded));
    }
}
