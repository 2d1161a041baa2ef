//! Soldrive program instructions and their account lists.

use std::sync::LazyLock;

use bytes::{BufMut, Bytes};

use crate::{
    address::{AddressDeriver, AddressError},
    pubkey::{Pubkey, system_program},
    record::{Access, Backend},
    wire::{DecodeError, Discriminator, Reader, instruction_discriminator, put_option, put_vec},
};

/// One account referenced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation: the program, the accounts it touches and its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Partial folder changes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderUpdate {
    pub parent: Option<u32>,
    pub name: Option<Vec<u8>>,
}

impl FolderUpdate {
    pub fn parent(parent: u32) -> Self {
        Self {
            parent: Some(parent),
            ..Default::default()
        }
    }
}

/// Partial file changes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub parent: Option<u32>,
    pub name: Option<Vec<u8>>,
    pub file_ext: Option<String>,
    pub file_size: Option<u64>,
    pub access: Option<Access>,
    pub backend: Option<Backend>,
    pub content: Option<Bytes>,
}

impl FileUpdate {
    pub fn parent(parent: u32) -> Self {
        Self {
            parent: Some(parent),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Arguments of a file creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewFile {
    pub max_size: u32,
    pub parent: u32,
    pub name: Vec<u8>,
    pub file_ext: String,
    pub file_size: u64,
    pub access: Access,
    pub backend: Backend,
    pub content: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramInstruction {
    /// No-op used to obtain a signature for key derivation.
    Sign,
    CreateUser,
    CreateFolder { parent: u32, name: Vec<u8> },
    UpdateFolder { id: u32, update: FolderUpdate },
    RemoveFolder { id: u32 },
    CreateFile(NewFile),
    UpdateFile { id: u32, update: FileUpdate },
    RemoveFile { id: u32 },
}

struct Discriminators {
    sign: Discriminator,
    create_user: Discriminator,
    create_folder: Discriminator,
    update_folder: Discriminator,
    remove_folder: Discriminator,
    create_file: Discriminator,
    update_file: Discriminator,
    remove_file: Discriminator,
}

static DISCRIMINATORS: LazyLock<Discriminators> = LazyLock::new(|| Discriminators {
    sign: instruction_discriminator("sign"),
    create_user: instruction_discriminator("create_user"),
    create_folder: instruction_discriminator("create_folder"),
    update_folder: instruction_discriminator("update_folder"),
    remove_folder: instruction_discriminator("remove_folder"),
    create_file: instruction_discriminator("create_file"),
    update_file: instruction_discriminator("update_file"),
    remove_file: instruction_discriminator("remove_file"),
});

impl ProgramInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            ProgramInstruction::Sign => "sign",
            ProgramInstruction::CreateUser => "create_user",
            ProgramInstruction::CreateFolder { .. } => "create_folder",
            ProgramInstruction::UpdateFolder { .. } => "update_folder",
            ProgramInstruction::RemoveFolder { .. } => "remove_folder",
            ProgramInstruction::CreateFile(_) => "create_file",
            ProgramInstruction::UpdateFile { .. } => "update_file",
            ProgramInstruction::RemoveFile { .. } => "remove_file",
        }
    }

    fn discriminator(&self) -> &'static Discriminator {
        let d = &*DISCRIMINATORS;
        match self {
            ProgramInstruction::Sign => &d.sign,
            ProgramInstruction::CreateUser => &d.create_user,
            ProgramInstruction::CreateFolder { .. } => &d.create_folder,
            ProgramInstruction::UpdateFolder { .. } => &d.update_folder,
            ProgramInstruction::RemoveFolder { .. } => &d.remove_folder,
            ProgramInstruction::CreateFile(_) => &d.create_file,
            ProgramInstruction::UpdateFile { .. } => &d.update_file,
            ProgramInstruction::RemoveFile { .. } => &d.remove_file,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_slice(self.discriminator());
        match self {
            ProgramInstruction::Sign | ProgramInstruction::CreateUser => {}
            ProgramInstruction::CreateFolder { parent, name } => {
                buf.put_u32_le(*parent);
                put_vec(&mut buf, name);
            }
            ProgramInstruction::UpdateFolder { id, update } => {
                buf.put_u32_le(*id);
                put_option(&mut buf, update.parent, |b, v| b.put_u32_le(v));
                put_option(&mut buf, update.name.as_deref(), |b, v| put_vec(b, v));
            }
            ProgramInstruction::RemoveFolder { id } | ProgramInstruction::RemoveFile { id } => {
                buf.put_u32_le(*id);
            }
            ProgramInstruction::CreateFile(file) => {
                buf.put_u32_le(file.max_size);
                buf.put_u32_le(file.parent);
                put_vec(&mut buf, &file.name);
                put_vec(&mut buf, file.file_ext.as_bytes());
                buf.put_u64_le(file.file_size);
                buf.put_u8(file.access.index());
                buf.put_u8(file.backend.index());
                put_vec(&mut buf, &file.content);
            }
            ProgramInstruction::UpdateFile { id, update } => {
                buf.put_u32_le(*id);
                put_option(&mut buf, update.parent, |b, v| b.put_u32_le(v));
                put_option(&mut buf, update.name.as_deref(), |b, v| put_vec(b, v));
                put_option(&mut buf, update.file_ext.as_deref(), |b, v| {
                    put_vec(b, v.as_bytes())
                });
                put_option(&mut buf, update.file_size, |b, v| b.put_u64_le(v));
                put_option(&mut buf, update.access, |b, v| b.put_u8(v.index()));
                put_option(&mut buf, update.backend, |b, v| b.put_u8(v.index()));
                put_option(&mut buf, update.content.as_deref(), |b, v| put_vec(b, v));
            }
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let disc = r.discriminator()?;
        let d = &*DISCRIMINATORS;
        let ix = if disc == d.sign {
            ProgramInstruction::Sign
        } else if disc == d.create_user {
            ProgramInstruction::CreateUser
        } else if disc == d.create_folder {
            ProgramInstruction::CreateFolder {
                parent: r.u32()?,
                name: r.vec()?,
            }
        } else if disc == d.update_folder {
            ProgramInstruction::UpdateFolder {
                id: r.u32()?,
                update: FolderUpdate {
                    parent: r.option(Reader::u32)?,
                    name: r.option(Reader::vec)?,
                },
            }
        } else if disc == d.remove_folder {
            ProgramInstruction::RemoveFolder { id: r.u32()? }
        } else if disc == d.create_file {
            ProgramInstruction::CreateFile(NewFile {
                max_size: r.u32()?,
                parent: r.u32()?,
                name: r.vec()?,
                file_ext: r.string("file_ext")?,
                file_size: r.u64()?,
                access: r.access()?,
                backend: r.backend()?,
                content: r.vec()?.into(),
            })
        } else if disc == d.update_file {
            ProgramInstruction::UpdateFile {
                id: r.u32()?,
                update: FileUpdate {
                    parent: r.option(Reader::u32)?,
                    name: r.option(Reader::vec)?,
                    file_ext: r.option(|r| r.string("file_ext"))?,
                    file_size: r.option(Reader::u64)?,
                    access: r.option(Reader::access)?,
                    backend: r.option(Reader::backend)?,
                    content: r.option(Reader::vec)?.map(Bytes::from),
                },
            }
        } else if disc == d.remove_file {
            ProgramInstruction::RemoveFile { id: r.u32()? }
        } else {
            return Err(DecodeError::UnknownInstruction(disc));
        };
        if r.remaining() != 0 {
            return Err(DecodeError::TrailingBytes(r.remaining()));
        }
        Ok(ix)
    }
}

/// Builds program instructions for one authority, resolving the record and
/// user addresses each instruction needs.
#[derive(Debug, Clone, Copy)]
pub struct InstructionBuilder {
    deriver: AddressDeriver,
}

impl InstructionBuilder {
    pub fn new(program_id: Pubkey, authority: Pubkey) -> Self {
        Self {
            deriver: AddressDeriver::new(program_id, authority),
        }
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn authority(&self) -> Pubkey {
        self.deriver.owner
    }

    fn instruction(&self, ix: ProgramInstruction, accounts: Vec<AccountMeta>) -> Instruction {
        Instruction {
            program_id: self.deriver.program_id,
            accounts,
            data: ix.encode(),
        }
    }

    fn create_accounts(&self, record: Pubkey) -> Result<Vec<AccountMeta>, AddressError> {
        Ok(vec![
            AccountMeta::new(record, false),
            AccountMeta::new(self.deriver.user()?, false),
            AccountMeta::new(self.authority(), true),
            AccountMeta::new_readonly(system_program::ID, false),
        ])
    }

    fn update_accounts(&self, record: Pubkey) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(record, false),
            AccountMeta::new_readonly(self.authority(), true),
        ]
    }

    fn remove_accounts(&self, record: Pubkey) -> Result<Vec<AccountMeta>, AddressError> {
        Ok(vec![
            AccountMeta::new(record, false),
            AccountMeta::new(self.deriver.user()?, false),
            AccountMeta::new(self.authority(), true),
        ])
    }

    pub fn sign(&self) -> Instruction {
        self.instruction(
            ProgramInstruction::Sign,
            vec![AccountMeta::new_readonly(self.authority(), true)],
        )
    }

    pub fn create_user(&self) -> Result<Instruction, AddressError> {
        let user = self.deriver.user()?;
        Ok(self.instruction(
            ProgramInstruction::CreateUser,
            vec![
                AccountMeta::new(user, false),
                AccountMeta::new(self.authority(), true),
                AccountMeta::new_readonly(system_program::ID, false),
            ],
        ))
    }

    /// `id` is the id the program will assign, i.e. the user's next folder id.
    pub fn create_folder(
        &self,
        id: u32,
        parent: u32,
        name: Vec<u8>,
    ) -> Result<Instruction, AddressError> {
        let accounts = self.create_accounts(self.deriver.folder(id)?)?;
        Ok(self.instruction(ProgramInstruction::CreateFolder { parent, name }, accounts))
    }

    pub fn update_folder(&self, id: u32, update: FolderUpdate) -> Result<Instruction, AddressError> {
        let accounts = self.update_accounts(self.deriver.folder(id)?);
        Ok(self.instruction(ProgramInstruction::UpdateFolder { id, update }, accounts))
    }

    pub fn remove_folder(&self, id: u32) -> Result<Instruction, AddressError> {
        let accounts = self.remove_accounts(self.deriver.folder(id)?)?;
        Ok(self.instruction(ProgramInstruction::RemoveFolder { id }, accounts))
    }

    /// `id` is the id the program will assign, i.e. the user's next file id.
    pub fn create_file(&self, id: u32, file: NewFile) -> Result<Instruction, AddressError> {
        let accounts = self.create_accounts(self.deriver.file(id)?)?;
        Ok(self.instruction(ProgramInstruction::CreateFile(file), accounts))
    }

    pub fn update_file(&self, id: u32, update: FileUpdate) -> Result<Instruction, AddressError> {
        let accounts = self.update_accounts(self.deriver.file(id)?);
        Ok(self.instruction(ProgramInstruction::UpdateFile { id, update }, accounts))
    }

    pub fn remove_file(&self, id: u32) -> Result<Instruction, AddressError> {
        let accounts = self.remove_accounts(self.deriver.file(id)?)?;
        Ok(self.instruction(ProgramInstruction::RemoveFile { id }, accounts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubkey::SOLDRIVE_PROGRAM_ID;

    #[test]
    fn update_file_roundtrips_partial_fields() {
        let ix = ProgramInstruction::UpdateFile {
            id: 4,
            update: FileUpdate {
                parent: Some(1),
                access: Some(Access::PublicReadWrite),
                content: Some(Bytes::from_static(b"abc")),
                ..Default::default()
            },
        };
        let data = ix.encode();
        assert_eq!(ProgramInstruction::decode(&data).unwrap(), ix);
    }

    #[test]
    fn create_file_layout() {
        let ix = ProgramInstruction::CreateFile(NewFile {
            max_size: 24,
            parent: 1,
            name: b"n".to_vec(),
            file_ext: "md".into(),
            file_size: 11,
            access: Access::Private,
            backend: Backend::Arweave,
            content: Bytes::from_static(b"hello world"),
        });
        let data = ix.encode();
        assert_eq!(&data[..8], &instruction_discriminator("create_file"));
        assert_eq!(&data[8..12], &24u32.to_le_bytes());
        assert_eq!(data.len(), 8 + 4 + 4 + 5 + 6 + 8 + 1 + 1 + 4 + 11);
        assert_eq!(ProgramInstruction::decode(&data).unwrap(), ix);
    }

    #[test]
    fn unknown_and_trailing_data_fail() {
        assert!(matches!(
            ProgramInstruction::decode(&[0u8; 8]),
            Err(DecodeError::UnknownInstruction(_))
        ));
        let mut data = ProgramInstruction::RemoveFile { id: 1 }.encode();
        data.push(0);
        assert_eq!(
            ProgramInstruction::decode(&data),
            Err(DecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn account_lists_follow_the_program() {
        let authority = Pubkey::new_from_array([9u8; 32]);
        let builder = InstructionBuilder::new(SOLDRIVE_PROGRAM_ID, authority);

        let create = builder.create_folder(1, 0, b"docs".to_vec()).unwrap();
        assert_eq!(create.accounts.len(), 4);
        assert_eq!(create.accounts[0].pubkey, builder.deriver().folder(1).unwrap());
        assert!(create.accounts[2].is_signer && create.accounts[2].is_writable);
        assert!(!create.accounts[3].is_writable);

        let update = builder.update_file(3, FileUpdate::parent(0)).unwrap();
        assert_eq!(update.accounts.len(), 2);
        assert!(update.accounts[1].is_signer && !update.accounts[1].is_writable);

        let remove = builder.remove_file(3).unwrap();
        assert_eq!(remove.accounts[1].pubkey, builder.deriver().user().unwrap());

        let sign = builder.sign();
        assert_eq!(sign.accounts, vec![AccountMeta::new_readonly(authority, true)]);
    }
}
