//! In-process execution of the Soldrive program's instructions.

use std::collections::HashMap;

use bytes::Bytes;
use sd_core::{
    Account, AddressDeriver, LedgerError, ProgramError, Pubkey, RecordKey,
    instruction::{AccountMeta, FileUpdate, FolderUpdate, Instruction, NewFile, ProgramInstruction},
    ledger::rent_exempt_minimum,
    pubkey::system_program,
    record::{File, Folder, User},
    wire,
};

pub(crate) type AccountMap = HashMap<Pubkey, Account>;

type ExecResult<T = ()> = Result<T, LedgerError>;

fn constraint(name: &str, account: &str) -> LedgerError {
    LedgerError::rejected(format!(
        "AnchorError caused by account: {account}. Error Code: {name}."
    ))
}

/// The Soldrive program as deployed at `id`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Program {
    pub id: Pubkey,
}

impl Program {
    pub fn execute(&self, accounts: &mut AccountMap, ix: &Instruction, now: i64) -> ExecResult {
        if ix.program_id != self.id {
            return Err(LedgerError::rejected(format!(
                "unsupported program {}",
                ix.program_id
            )));
        }
        let decoded = ProgramInstruction::decode(&ix.data)?;
        tracing::trace!(instruction = decoded.name(), "executing");
        let mut ctx = Context {
            program: *self,
            accounts,
            metas: &ix.accounts,
            now,
        };
        match decoded {
            ProgramInstruction::Sign => {
                ctx.signer(0)?;
                Ok(())
            }
            ProgramInstruction::CreateUser => ctx.create_user(),
            ProgramInstruction::CreateFolder { parent, name } => ctx.create_folder(parent, name),
            ProgramInstruction::UpdateFolder { id, update } => ctx.update_folder(id, update),
            ProgramInstruction::RemoveFolder { id } => ctx.remove_folder(id),
            ProgramInstruction::CreateFile(file) => ctx.create_file(file),
            ProgramInstruction::UpdateFile { id, update } => ctx.update_file(id, update),
            ProgramInstruction::RemoveFile { id } => ctx.remove_file(id),
        }
    }
}

struct Context<'a> {
    program: Program,
    accounts: &'a mut AccountMap,
    metas: &'a [AccountMeta],
    now: i64,
}

impl Context<'_> {
    fn meta(&self, index: usize) -> ExecResult<&AccountMeta> {
        self.metas
            .get(index)
            .ok_or_else(|| LedgerError::rejected("AccountNotEnoughKeys"))
    }

    fn signer(&self, index: usize) -> ExecResult<Pubkey> {
        let meta = self.meta(index)?;
        if !meta.is_signer {
            return Err(constraint("AccountNotSigner", "authority"));
        }
        Ok(meta.pubkey)
    }

    /// Resolves a writable account whose address must match `key`'s seeds.
    fn seeded(&self, index: usize, authority: &Pubkey, key: RecordKey, name: &str) -> ExecResult<Pubkey> {
        let meta = self.meta(index)?;
        let expected = AddressDeriver::new(self.program.id, *authority).derive(key)?;
        if meta.pubkey != expected.address {
            return Err(constraint("ConstraintSeeds", name));
        }
        if !meta.is_writable {
            return Err(constraint("ConstraintMut", name));
        }
        Ok(meta.pubkey)
    }

    fn system_program(&self, index: usize) -> ExecResult {
        if self.meta(index)?.pubkey != system_program::ID {
            return Err(constraint("InvalidProgramId", "system_program"));
        }
        Ok(())
    }

    fn data(&self, address: &Pubkey, name: &str) -> ExecResult<&[u8]> {
        match self.accounts.get(address) {
            Some(account) if account.owner == self.program.id => Ok(&account.data),
            Some(_) => Err(constraint("AccountOwnedByWrongProgram", name)),
            None => Err(constraint("AccountNotInitialized", name)),
        }
    }

    fn store(&mut self, address: Pubkey, data: Vec<u8>) {
        if let Some(account) = self.accounts.get_mut(&address) {
            account.data = Bytes::from(data);
        }
    }

    /// Allocates a program account funded by `payer`.
    fn init(&mut self, address: Pubkey, payer: &Pubkey, data: Vec<u8>, name: &str) -> ExecResult {
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::rejected(format!(
                "Allocate: account {address} already in use ({name})"
            )));
        }
        let rent = rent_exempt_minimum(data.len());
        let funds = self.accounts.get_mut(payer).map(|a| &mut a.lamports);
        match funds {
            Some(lamports) if *lamports >= rent => *lamports -= rent,
            _ => {
                return Err(LedgerError::rejected(format!(
                    "Transfer: insufficient lamports, need {rent}"
                )));
            }
        }
        self.accounts.insert(
            address,
            Account {
                lamports: rent,
                owner: self.program.id,
                data: Bytes::from(data),
            },
        );
        Ok(())
    }

    /// Closes a program account, refunding its lamports to `to`.
    fn close(&mut self, address: &Pubkey, to: &Pubkey) -> ExecResult {
        let account = self
            .accounts
            .remove(address)
            .ok_or(LedgerError::AccountNotFound(*address))?;
        self.accounts.entry(*to).or_default().lamports += account.lamports;
        Ok(())
    }

    fn user(&self, address: &Pubkey) -> ExecResult<User> {
        Ok(wire::decode_user(self.data(address, "user")?)?)
    }

    fn create_user(&mut self) -> ExecResult {
        let authority = self.signer(1)?;
        let user = self.seeded(0, &authority, RecordKey::User, "user")?;
        self.system_program(2)?;
        let record = User {
            created_at: self.now,
            encryption: true,
            ..Default::default()
        };
        self.init(user, &authority, wire::encode_user(&record), "user")
    }

    fn create_folder(&mut self, parent: u32, name: Vec<u8>) -> ExecResult {
        let authority = self.signer(2)?;
        let user_address = self.seeded(1, &authority, RecordKey::User, "user")?;
        let mut user = self.user(&user_address)?;
        let id = user.next_folder_id()?;
        let folder_address = self.seeded(0, &authority, RecordKey::Folder(id), "folder")?;
        self.system_program(3)?;
        if name.len() > wire::NAME_MAX_LEN {
            return Err(ProgramError::StringTooLong.into());
        }

        user.folder_id = id;
        user.folder_count += 1;
        let folder = Folder {
            owner: authority,
            id,
            created_at: self.now,
            parent,
            name,
        };
        self.init(folder_address, &authority, wire::encode_folder(&folder), "folder")?;
        self.store(user_address, wire::encode_user(&user));
        Ok(())
    }

    fn update_folder(&mut self, id: u32, update: FolderUpdate) -> ExecResult {
        let authority = self.signer(1)?;
        let address = self.seeded(0, &authority, RecordKey::Folder(id), "folder")?;
        let mut folder = wire::decode_folder(self.data(&address, "folder")?)?;
        if let Some(parent) = update.parent {
            folder.parent = parent;
        }
        if let Some(name) = update.name {
            if name.len() > wire::NAME_MAX_LEN {
                return Err(ProgramError::StringTooLong.into());
            }
            folder.name = name;
        }
        self.store(address, wire::encode_folder(&folder));
        Ok(())
    }

    fn remove_folder(&mut self, id: u32) -> ExecResult {
        let authority = self.signer(2)?;
        let address = self.seeded(0, &authority, RecordKey::Folder(id), "folder")?;
        let user_address = self.seeded(1, &authority, RecordKey::User, "user")?;
        self.data(&address, "folder")?;
        let mut user = self.user(&user_address)?;
        user.folder_count = user
            .folder_count
            .checked_sub(1)
            .ok_or_else(|| LedgerError::rejected("arithmetic underflow in folder_count"))?;
        self.store(user_address, wire::encode_user(&user));
        self.close(&address, &authority)
    }

    fn create_file(&mut self, new: NewFile) -> ExecResult {
        let authority = self.signer(2)?;
        let user_address = self.seeded(1, &authority, RecordKey::User, "user")?;
        let mut user = self.user(&user_address)?;
        let id = user.next_file_id()?;
        let file_address = self.seeded(0, &authority, RecordKey::File(id), "file")?;
        self.system_program(3)?;
        if new.name.len() > wire::NAME_MAX_LEN || new.file_ext.len() > wire::EXT_MAX_LEN {
            return Err(ProgramError::StringTooLong.into());
        }
        if new.content.len() > new.max_size as usize {
            return Err(ProgramError::DataSizeExceeded.into());
        }

        user.file_id = id;
        user.file_count += 1;
        user.space_used = user
            .space_used
            .checked_add(new.max_size)
            .ok_or_else(|| LedgerError::rejected("arithmetic overflow in space_used"))?;
        let file = File {
            owner: authority,
            id,
            created_at: self.now,
            parent: new.parent,
            name: new.name,
            file_ext: new.file_ext,
            file_size: new.file_size,
            access: new.access,
            backend: new.backend,
            size: new.content.len() as u32,
            max_size: new.max_size,
            content: Some(new.content),
        };
        let data = wire::encode_file(&file).ok_or(ProgramError::DataSizeExceeded)?;
        self.init(file_address, &authority, data, "file")?;
        self.store(user_address, wire::encode_user(&user));
        Ok(())
    }

    fn update_file(&mut self, id: u32, update: FileUpdate) -> ExecResult {
        let authority = self.signer(1)?;
        let address = self.seeded(0, &authority, RecordKey::File(id), "file")?;
        let mut file = wire::decode_file(self.data(&address, "file")?, true)?;
        if let Some(parent) = update.parent {
            file.parent = parent;
        }
        if let Some(name) = update.name {
            if name.len() > wire::NAME_MAX_LEN {
                return Err(ProgramError::StringTooLong.into());
            }
            file.name = name;
        }
        if let Some(ext) = update.file_ext {
            if ext.len() > wire::EXT_MAX_LEN {
                return Err(ProgramError::StringTooLong.into());
            }
            file.file_ext = ext;
        }
        if let Some(file_size) = update.file_size {
            file.file_size = file_size;
        }
        if let Some(access) = update.access {
            file.access = access;
        }
        if let Some(backend) = update.backend {
            file.backend = backend;
        }
        if let Some(content) = update.content {
            if !file.fits(content.len()) {
                return Err(ProgramError::DataSizeExceeded.into());
            }
            file.size = content.len() as u32;
            file.content = Some(content);
        }
        let data = wire::encode_file(&file).ok_or(ProgramError::DataSizeExceeded)?;
        self.store(address, data);
        Ok(())
    }

    fn remove_file(&mut self, id: u32) -> ExecResult {
        let authority = self.signer(2)?;
        let address = self.seeded(0, &authority, RecordKey::File(id), "file")?;
        let user_address = self.seeded(1, &authority, RecordKey::User, "user")?;
        let capacity = self
            .data(&address, "file")?
            .len()
            .saturating_sub(wire::FILE_HEADER_SPACE) as u32;
        let mut user = self.user(&user_address)?;
        user.file_count = user
            .file_count
            .checked_sub(1)
            .ok_or_else(|| LedgerError::rejected("arithmetic underflow in file_count"))?;
        user.space_used = user.space_used.saturating_sub(capacity);
        self.store(user_address, wire::encode_user(&user));
        self.close(&address, &authority)
    }
}
