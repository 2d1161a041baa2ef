//! Byte layout of Soldrive accounts.
//!
//! Accounts start with an 8-byte discriminator (`sha256("account:<Name>")`)
//! followed by the fields in declaration order: little-endian integers,
//! length-prefixed byte vectors and strings, `Option` as a presence byte and
//! enums as a one-byte variant index. File accounts additionally carry their
//! content in the trailing `size` bytes of the account data.

use std::sync::LazyLock;

use bytes::{Buf, BufMut, Bytes};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    pubkey::Pubkey,
    record::{Access, Backend, File, Folder, User},
};

pub const DISCRIMINATOR_LEN: usize = 8;

/// Reserved trailing bytes of every account.
const PADDING: usize = 48;

pub const NAME_MAX_LEN: usize = 64;
pub const EXT_MAX_LEN: usize = 4;

/// Size of a user account.
pub const USER_SPACE: usize = DISCRIMINATOR_LEN + 8 + 4 * 5 + 1 + PADDING;

/// Size of a folder account.
pub const FOLDER_SPACE: usize = DISCRIMINATOR_LEN + 32 + 4 + 8 + 4 + 4 + 4 * NAME_MAX_LEN + PADDING;

/// Size of a file account without content.
pub const FILE_HEADER_SPACE: usize = DISCRIMINATOR_LEN
    + 32
    + 4
    + 8
    + 4
    + (4 + NAME_MAX_LEN)
    + (4 + EXT_MAX_LEN)
    + 8
    + 1
    + 1
    + 4
    + 4
    + PADDING;

/// Offset of the owner key in folder and file accounts.
pub const OWNER_OFFSET: usize = DISCRIMINATOR_LEN;

/// Offset of the parent id in folder and file accounts.
pub const PARENT_OFFSET: usize = DISCRIMINATOR_LEN + 32 + 4 + 8;

/// Size of a file account able to hold `max_size` content bytes.
pub fn file_space(max_size: u32) -> usize {
    FILE_HEADER_SPACE + max_size as usize
}

pub type Discriminator = [u8; DISCRIMINATOR_LEN];

fn discriminator(namespace: &str, name: &str) -> Discriminator {
    let hash = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update(b":")
        .chain_update(name.as_bytes())
        .finalize();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    out
}

pub fn account_discriminator(name: &str) -> Discriminator {
    discriminator("account", name)
}

pub fn instruction_discriminator(name: &str) -> Discriminator {
    discriminator("global", name)
}

pub static USER_DISCRIMINATOR: LazyLock<Discriminator> =
    LazyLock::new(|| account_discriminator("User"));
pub static FOLDER_DISCRIMINATOR: LazyLock<Discriminator> =
    LazyLock::new(|| account_discriminator("Folder"));
pub static FILE_DISCRIMINATOR: LazyLock<Discriminator> =
    LazyLock::new(|| account_discriminator("File"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },
    #[error("account is not a {0}")]
    WrongDiscriminator(&'static str),
    #[error("invalid {kind} variant {index}")]
    InvalidVariant { kind: &'static str, index: u8 },
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("content of {size} bytes does not fit an account of {len} bytes")]
    ContentOutOfBounds { size: u32, len: usize },
    #[error("unknown instruction discriminator {0:?}")]
    UnknownInstruction(Discriminator),
    #[error("{0} trailing bytes after instruction data")]
    TrailingBytes(usize),
}

/// Cursor over encoded bytes that reports truncation instead of panicking.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < needed {
            return Err(DecodeError::UnexpectedEnd {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn discriminator(&mut self) -> Result<Discriminator, DecodeError> {
        self.need(DISCRIMINATOR_LEN)?;
        let mut out = [0u8; DISCRIMINATOR_LEN];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn u64(&mut self) -> Result<u64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub(crate) fn i64(&mut self) -> Result<i64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub(crate) fn pubkey(&mut self) -> Result<Pubkey, DecodeError> {
        self.need(32)?;
        let mut out = [0u8; 32];
        self.buf.copy_to_slice(&mut out);
        Ok(Pubkey::new_from_array(out))
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn vec(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub(crate) fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        String::from_utf8(self.vec()?).map_err(|_| DecodeError::InvalidUtf8(field))
    }

    pub(crate) fn option<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Option<T>, DecodeError> {
        match self.u8()? {
            0 => Ok(None),
            1 => read(self).map(Some),
            index => Err(DecodeError::InvalidVariant {
                kind: "option",
                index,
            }),
        }
    }

    pub(crate) fn access(&mut self) -> Result<Access, DecodeError> {
        let index = self.u8()?;
        Access::from_index(index).ok_or(DecodeError::InvalidVariant {
            kind: "access",
            index,
        })
    }

    pub(crate) fn backend(&mut self) -> Result<Backend, DecodeError> {
        let index = self.u8()?;
        Backend::from_index(index).ok_or(DecodeError::InvalidVariant {
            kind: "backend",
            index,
        })
    }
}

pub(crate) fn put_vec(buf: &mut impl BufMut, bytes: &[u8]) {
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn put_option<T>(buf: &mut Vec<u8>, value: Option<T>, write: impl FnOnce(&mut Vec<u8>, T)) {
    match value {
        Some(value) => {
            buf.put_u8(1);
            write(buf, value);
        }
        None => buf.put_u8(0),
    }
}

fn expect_discriminator(
    reader: &mut Reader<'_>,
    expected: &Discriminator,
    kind: &'static str,
) -> Result<(), DecodeError> {
    if &reader.discriminator()? != expected {
        return Err(DecodeError::WrongDiscriminator(kind));
    }
    Ok(())
}

pub fn decode_user(data: &[u8]) -> Result<User, DecodeError> {
    let mut r = Reader::new(data);
    expect_discriminator(&mut r, &USER_DISCRIMINATOR, "User")?;
    Ok(User {
        created_at: r.i64()?,
        folder_id: r.u32()?,
        file_id: r.u32()?,
        folder_count: r.u32()?,
        file_count: r.u32()?,
        space_used: r.u32()?,
        encryption: r.bool()?,
    })
}

pub fn encode_user(user: &User) -> Vec<u8> {
    let mut buf = Vec::with_capacity(USER_SPACE);
    buf.put_slice(&*USER_DISCRIMINATOR);
    buf.put_i64_le(user.created_at);
    buf.put_u32_le(user.folder_id);
    buf.put_u32_le(user.file_id);
    buf.put_u32_le(user.folder_count);
    buf.put_u32_le(user.file_count);
    buf.put_u32_le(user.space_used);
    buf.put_u8(user.encryption as u8);
    buf.resize(USER_SPACE, 0);
    buf
}

pub fn decode_folder(data: &[u8]) -> Result<Folder, DecodeError> {
    let mut r = Reader::new(data);
    expect_discriminator(&mut r, &FOLDER_DISCRIMINATOR, "Folder")?;
    Ok(Folder {
        owner: r.pubkey()?,
        id: r.u32()?,
        created_at: r.i64()?,
        parent: r.u32()?,
        name: r.vec()?,
    })
}

pub fn encode_folder(folder: &Folder) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FOLDER_SPACE);
    buf.put_slice(&*FOLDER_DISCRIMINATOR);
    buf.put_slice(folder.owner.as_bytes());
    buf.put_u32_le(folder.id);
    buf.put_i64_le(folder.created_at);
    buf.put_u32_le(folder.parent);
    put_vec(&mut buf, &folder.name);
    if buf.len() < FOLDER_SPACE {
        buf.resize(FOLDER_SPACE, 0);
    }
    buf
}

/// Decodes a file account, attaching the trailing content when asked to.
pub fn decode_file(data: &[u8], with_content: bool) -> Result<File, DecodeError> {
    let mut r = Reader::new(data);
    expect_discriminator(&mut r, &FILE_DISCRIMINATOR, "File")?;
    let mut file = File {
        owner: r.pubkey()?,
        id: r.u32()?,
        created_at: r.i64()?,
        parent: r.u32()?,
        name: r.vec()?,
        file_ext: r.string("file_ext")?,
        file_size: r.u64()?,
        access: r.access()?,
        backend: r.backend()?,
        size: r.u32()?,
        max_size: r.u32()?,
        content: None,
    };
    let header_end = data.len() - r.remaining();
    let size = file.size as usize;
    if size > data.len() || data.len() - size < header_end {
        return Err(DecodeError::ContentOutOfBounds {
            size: file.size,
            len: data.len(),
        });
    }
    if with_content {
        file.content = Some(Bytes::copy_from_slice(&data[data.len() - size..]));
    }
    Ok(file)
}

/// Encodes a file account of `file_space(max_size)` bytes with the content
/// placed at the end.
///
/// Returns `None` when the content does not fit the reserved capacity.
pub fn encode_file(file: &File) -> Option<Vec<u8>> {
    let content = file.content_bytes();
    let len = file_space(file.max_size);
    if content.len() > file.max_size as usize {
        return None;
    }
    let mut buf = Vec::with_capacity(len);
    buf.put_slice(&*FILE_DISCRIMINATOR);
    buf.put_slice(file.owner.as_bytes());
    buf.put_u32_le(file.id);
    buf.put_i64_le(file.created_at);
    buf.put_u32_le(file.parent);
    put_vec(&mut buf, &file.name);
    put_vec(&mut buf, file.file_ext.as_bytes());
    buf.put_u64_le(file.file_size);
    buf.put_u8(file.access.index());
    buf.put_u8(file.backend.index());
    buf.put_u32_le(content.len() as u32);
    buf.put_u32_le(file.max_size);
    if buf.len() > len - content.len() {
        return None;
    }
    buf.resize(len - content.len(), 0);
    buf.put_slice(content);
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file(content: &'static [u8], max_size: u32) -> File {
        File {
            owner: Pubkey::new_from_array([3u8; 32]),
            id: 7,
            created_at: 1_700_000_000,
            parent: 2,
            name: b"report".to_vec(),
            file_ext: "txt".into(),
            file_size: content.len() as u64,
            access: Access::PublicRead,
            backend: Backend::Solana,
            size: content.len() as u32,
            max_size,
            content: Some(Bytes::from_static(content)),
        }
    }

    #[test]
    fn account_sizes() {
        assert_eq!(USER_SPACE, 85);
        assert_eq!(FOLDER_SPACE, 364);
        assert_eq!(FILE_HEADER_SPACE, 198);
        assert_eq!(PARENT_OFFSET, 52);
        assert_eq!(file_space(24), 222);
    }

    #[test]
    fn discriminators_are_distinct() {
        assert_ne!(*USER_DISCRIMINATOR, *FOLDER_DISCRIMINATOR);
        assert_ne!(*FOLDER_DISCRIMINATOR, *FILE_DISCRIMINATOR);
        assert_eq!(
            account_discriminator("File"),
            *FILE_DISCRIMINATOR,
            "discriminator is stable"
        );
    }

    #[test]
    fn file_content_sits_at_the_tail() {
        let file = sample_file(b"hello world", 24);
        let data = encode_file(&file).unwrap();
        assert_eq!(data.len(), file_space(24));
        assert!(data.ends_with(b"hello world"));

        let decoded = decode_file(&data, true).unwrap();
        assert_eq!(decoded, file);

        let bare = decode_file(&data, false).unwrap();
        assert_eq!(bare.content, None);
        assert_eq!(bare.size, 11);
    }

    #[test]
    fn oversized_content_is_not_encoded() {
        assert!(encode_file(&sample_file(b"0123456789", 9)).is_none());
        assert!(encode_file(&sample_file(b"0123456789", 10)).is_some());
    }

    #[test]
    fn scan_offsets_point_at_owner_and_parent() {
        let file = sample_file(b"", 0);
        let data = encode_file(&file).unwrap();
        assert_eq!(&data[OWNER_OFFSET..OWNER_OFFSET + 32], file.owner.as_bytes());
        assert_eq!(&data[PARENT_OFFSET..PARENT_OFFSET + 4], &2u32.to_le_bytes());

        let folder = Folder {
            owner: file.owner,
            id: 1,
            created_at: 5,
            parent: 9,
            name: vec![1, 2, 3],
        };
        let data = encode_folder(&folder);
        assert_eq!(data.len(), FOLDER_SPACE);
        assert_eq!(&data[PARENT_OFFSET..PARENT_OFFSET + 4], &9u32.to_le_bytes());
        assert_eq!(decode_folder(&data).unwrap(), folder);
    }

    #[test]
    fn wrong_account_kind_is_rejected() {
        let data = encode_user(&User::default());
        assert_eq!(data.len(), USER_SPACE);
        assert_eq!(
            decode_folder(&data),
            Err(DecodeError::WrongDiscriminator("Folder"))
        );
        assert!(matches!(
            decode_user(&data[..10]),
            Err(DecodeError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn bad_enum_index_is_rejected() {
        let mut data = encode_file(&sample_file(b"x", 4)).unwrap();
        // access byte follows the name and extension
        let access_at = PARENT_OFFSET + 4 + 4 + 6 + 4 + 3 + 8;
        data[access_at] = 9;
        assert_eq!(
            decode_file(&data, false),
            Err(DecodeError::InvalidVariant {
                kind: "access",
                index: 9
            })
        );
    }
}
