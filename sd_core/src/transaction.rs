//! Legacy ledger transactions.
//!
//! A transaction is a list of signatures over one message. The message
//! lists every account its instructions reference exactly once, ordered
//! writable signers, readonly signers, writable non-signers, readonly
//! non-signers, with the fee payer first. All instructions of a transaction
//! are applied together or not at all, which is what makes a transaction an
//! atomic group.

use bytes::BufMut;
use thiserror::Error;

use crate::{
    instruction::{AccountMeta, Instruction},
    pubkey::{Blockhash, Pubkey, Signature},
    signer::{Signer, SignerError},
    wire::{DecodeError, Reader},
};

/// Largest serialized transaction the ledger accepts.
pub const PACKET_DATA_SIZE: usize = 1232;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction of {size} bytes exceeds the {PACKET_DATA_SIZE} byte limit")]
    TooLarge { size: usize },
    #[error("transaction has no instructions")]
    Empty,
    #[error("too many accounts: {0}")]
    TooManyAccounts(usize),
    #[error("missing signature for {0}")]
    MissingSigner(Pubkey),
    #[error("{0} is not a required signer")]
    UnexpectedSigner(Pubkey),
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("account index {0} out of range")]
    InvalidIndex(u8),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

fn put_compact_u16(buf: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        byte |= 0x80;
        buf.put_u8(byte);
    }
}

fn get_compact_u16(r: &mut Reader<'_>) -> Result<u16, DecodeError> {
    let mut value: u32 = 0;
    for i in 0..3 {
        let byte = r.u8()?;
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value).map_err(|_| DecodeError::InvalidVariant {
                kind: "compact-u16",
                index: byte,
            });
        }
    }
    Err(DecodeError::InvalidVariant {
        kind: "compact-u16",
        index: 0x80,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// An instruction with its program and accounts replaced by key indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compiles `instructions` into a message paid for by `payer`.
    pub fn compile(
        instructions: &[Instruction],
        payer: &Pubkey,
        recent_blockhash: Blockhash,
    ) -> Result<Self, TransactionError> {
        if instructions.is_empty() {
            return Err(TransactionError::Empty);
        }

        // first-seen order with merged flags, payer first
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::new(*payer, true)];
        let mut merge = |meta: AccountMeta| match metas.iter_mut().find(|m| m.pubkey == meta.pubkey)
        {
            Some(existing) => {
                existing.is_signer |= meta.is_signer;
                existing.is_writable |= meta.is_writable;
            }
            None => metas.push(meta),
        };
        for ix in instructions {
            for meta in &ix.accounts {
                merge(*meta);
            }
            merge(AccountMeta::new_readonly(ix.program_id, false));
        }

        let class = |m: &AccountMeta| match (m.is_signer, m.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        // stable sort keeps the payer ahead of other writable signers
        metas.sort_by_key(class);

        if metas.len() > u8::MAX as usize {
            return Err(TransactionError::TooManyAccounts(metas.len()));
        }
        let header = MessageHeader {
            num_required_signatures: metas.iter().filter(|m| m.is_signer).count() as u8,
            num_readonly_signed_accounts: metas.iter().filter(|m| class(*m) == 1).count() as u8,
            num_readonly_unsigned_accounts: metas.iter().filter(|m| class(*m) == 3).count() as u8,
        };
        let account_keys: Vec<Pubkey> = metas.iter().map(|m| m.pubkey).collect();
        let index_of = |key: &Pubkey| -> u8 {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .unwrap_or_default()
        };
        let compiled = instructions
            .iter()
            .map(|ix| CompiledInstruction {
                program_id_index: index_of(&ix.program_id),
                accounts: ix.accounts.iter().map(|m| index_of(&m.pubkey)).collect(),
                data: ix.data.clone(),
            })
            .collect();

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    pub fn signers(&self) -> &[Pubkey] {
        let n = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let h = &self.header;
        let signed = h.num_required_signatures as usize;
        if index < signed {
            index < signed.saturating_sub(h.num_readonly_signed_accounts as usize)
        } else {
            let unsigned_writable = self
                .account_keys
                .len()
                .saturating_sub(signed + h.num_readonly_unsigned_accounts as usize);
            index - signed < unsigned_writable
        }
    }

    /// Expands compiled instructions back into full instructions.
    pub fn decompile(&self) -> Result<Vec<Instruction>, TransactionError> {
        let key = |index: u8| {
            self.account_keys
                .get(index as usize)
                .copied()
                .ok_or(TransactionError::InvalidIndex(index))
        };
        self.instructions
            .iter()
            .map(|ix| {
                let accounts = ix
                    .accounts
                    .iter()
                    .map(|&i| {
                        Ok(AccountMeta {
                            pubkey: key(i)?,
                            is_signer: self.is_signer(i as usize),
                            is_writable: self.is_writable(i as usize),
                        })
                    })
                    .collect::<Result<Vec<_>, TransactionError>>()?;
                Ok(Instruction {
                    program_id: key(ix.program_id_index)?,
                    accounts,
                    data: ix.data.clone(),
                })
            })
            .collect()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u8(self.header.num_required_signatures);
        buf.put_u8(self.header.num_readonly_signed_accounts);
        buf.put_u8(self.header.num_readonly_unsigned_accounts);
        put_compact_u16(&mut buf, self.account_keys.len() as u16);
        for key in &self.account_keys {
            buf.put_slice(key.as_bytes());
        }
        buf.put_slice(self.recent_blockhash.as_bytes());
        put_compact_u16(&mut buf, self.instructions.len() as u16);
        for ix in &self.instructions {
            buf.put_u8(ix.program_id_index);
            put_compact_u16(&mut buf, ix.accounts.len() as u16);
            buf.put_slice(&ix.accounts);
            put_compact_u16(&mut buf, ix.data.len() as u16);
            buf.put_slice(&ix.data);
        }
        buf
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let header = MessageHeader {
            num_required_signatures: r.u8()?,
            num_readonly_signed_accounts: r.u8()?,
            num_readonly_unsigned_accounts: r.u8()?,
        };
        let key_count = get_compact_u16(r)?;
        let account_keys = (0..key_count)
            .map(|_| r.pubkey())
            .collect::<Result<Vec<_>, _>>()?;
        let recent_blockhash = Blockhash::new_from_array(r.pubkey()?.to_bytes());
        let ix_count = get_compact_u16(r)?;
        let mut instructions = Vec::with_capacity(ix_count as usize);
        for _ in 0..ix_count {
            let program_id_index = r.u8()?;
            let len = get_compact_u16(r)? as usize;
            let accounts = r.take(len)?.to_vec();
            let len = get_compact_u16(r)? as usize;
            let data = r.take(len)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }
        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read(&mut Reader::new(data))
    }
}

/// A message together with the signatures of all its required signers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    pub message: Message,
}

impl Transaction {
    pub fn new_unsigned(message: Message) -> Self {
        let signatures = vec![Signature::default(); message.signers().len()];
        Self {
            signatures,
            message,
        }
    }

    /// Compiles and signs `instructions` in one step.
    pub fn new_signed(
        instructions: &[Instruction],
        payer: &dyn Signer,
        signers: &[&dyn Signer],
        recent_blockhash: Blockhash,
    ) -> Result<Self, TransactionError> {
        let message = Message::compile(instructions, &payer.pubkey(), recent_blockhash)?;
        let mut tx = Self::new_unsigned(message);
        tx.sign(&[payer])?;
        tx.sign(signers)?;
        tx.ensure_signed()?;
        Ok(tx)
    }

    /// Adds signatures from `signers`, each at its key's position.
    pub fn sign(&mut self, signers: &[&dyn Signer]) -> Result<(), TransactionError> {
        let message = self.message.serialize();
        for signer in signers {
            let key = signer.pubkey();
            let index = self
                .message
                .signers()
                .iter()
                .position(|k| *k == key)
                .ok_or(TransactionError::UnexpectedSigner(key))?;
            self.signatures[index] = signer.try_sign_message(&message)?;
        }
        Ok(())
    }

    fn ensure_signed(&self) -> Result<(), TransactionError> {
        let unsigned = Signature::default();
        match self
            .message
            .signers()
            .iter()
            .zip(&self.signatures)
            .find(|(_, sig)| **sig == unsigned)
        {
            Some((key, _)) => Err(TransactionError::MissingSigner(*key)),
            None => Ok(()),
        }
    }

    /// The first signature identifies the transaction.
    pub fn signature(&self) -> Option<&Signature> {
        self.signatures.first()
    }

    /// Checks every required signature against the message.
    pub fn verify(&self) -> Result<(), TransactionError> {
        let signers = self.message.signers();
        if self.signatures.len() != signers.len() {
            return Err(TransactionError::InvalidSignature);
        }
        let message = self.message.serialize();
        if signers
            .iter()
            .zip(&self.signatures)
            .all(|(key, sig)| sig.verify(key, &message))
        {
            Ok(())
        } else {
            Err(TransactionError::InvalidSignature)
        }
    }

    /// Wire form; fails when the ledger would refuse the packet.
    pub fn serialize(&self) -> Result<Vec<u8>, TransactionError> {
        let mut buf = Vec::new();
        put_compact_u16(&mut buf, self.signatures.len() as u16);
        for sig in &self.signatures {
            buf.put_slice(sig.as_bytes());
        }
        buf.extend_from_slice(&self.message.serialize());
        if buf.len() > PACKET_DATA_SIZE {
            return Err(TransactionError::TooLarge { size: buf.len() });
        }
        Ok(buf)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, TransactionError> {
        if data.len() > PACKET_DATA_SIZE {
            return Err(TransactionError::TooLarge { size: data.len() });
        }
        let mut r = Reader::new(data);
        let count = get_compact_u16(&mut r)?;
        let mut signatures = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let bytes: [u8; 64] = r
                .take(64)?
                .try_into()
                .map_err(|_| DecodeError::UnexpectedEnd {
                    needed: 64,
                    remaining: 0,
                })?;
            signatures.push(Signature::new_from_array(bytes));
        }
        let message = Message::read(&mut r)?;
        if r.remaining() != 0 {
            return Err(DecodeError::TrailingBytes(r.remaining()).into());
        }
        Ok(Self {
            signatures,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instruction::InstructionBuilder,
        pubkey::{SOLDRIVE_PROGRAM_ID, system_program},
        signer::Keypair,
    };

    #[test]
    fn compact_u16_encoding() {
        for (value, expected) in [
            (0u16, vec![0x00]),
            (0x7f, vec![0x7f]),
            (0x80, vec![0x80, 0x01]),
            (0x3fff, vec![0xff, 0x7f]),
            (0xffff, vec![0xff, 0xff, 0x03]),
        ] {
            let mut buf = Vec::new();
            put_compact_u16(&mut buf, value);
            assert_eq!(buf, expected);
            assert_eq!(get_compact_u16(&mut Reader::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn keys_are_ordered_by_role() {
        let keypair = Keypair::generate();
        let builder = InstructionBuilder::new(SOLDRIVE_PROGRAM_ID, keypair.pubkey());
        let ix = builder.create_folder(1, 0, b"docs".to_vec()).unwrap();
        let message = Message::compile(&[ix], &keypair.pubkey(), Blockhash::ZERO).unwrap();

        assert_eq!(message.account_keys[0], keypair.pubkey());
        assert_eq!(message.header.num_required_signatures, 1);
        assert_eq!(message.header.num_readonly_signed_accounts, 0);
        // system program and the soldrive program
        assert_eq!(message.header.num_readonly_unsigned_accounts, 2);
        assert!(message.is_writable(0));
        assert!(message.is_writable(1) && message.is_writable(2));
        assert!(!message.is_writable(3));
        assert!(message.account_keys[3..].contains(&system_program::ID));

        let decompiled = message.decompile().unwrap();
        assert_eq!(decompiled[0].accounts[0].pubkey, builder.deriver().folder(1).unwrap());
        assert!(decompiled[0].accounts[2].is_signer);
    }

    #[test]
    fn signed_transaction_roundtrips_and_verifies() {
        let keypair = Keypair::generate();
        let builder = InstructionBuilder::new(SOLDRIVE_PROGRAM_ID, keypair.pubkey());
        let ixs = vec![
            builder.remove_file(1).unwrap(),
            builder.update_folder(2, Default::default()).unwrap(),
        ];
        let tx = Transaction::new_signed(&ixs, &keypair, &[], Blockhash::new_from_array([5; 32]))
            .unwrap();
        tx.verify().unwrap();

        let bytes = tx.serialize().unwrap();
        let back = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(back, tx);
        let decompiled = back.message.decompile().unwrap();
        assert_eq!(decompiled.len(), 2);
        for (got, sent) in decompiled.iter().zip(&ixs) {
            assert_eq!(got.data, sent.data);
            assert_eq!(got.program_id, sent.program_id);
        }

        let mut tampered = tx.clone();
        tampered.message.recent_blockhash = Blockhash::ZERO;
        assert!(matches!(
            tampered.verify(),
            Err(TransactionError::InvalidSignature)
        ));
    }

    #[test]
    fn oversize_transactions_are_rejected() {
        let keypair = Keypair::generate();
        let builder = InstructionBuilder::new(SOLDRIVE_PROGRAM_ID, keypair.pubkey());
        let ix = builder
            .update_file(
                1,
                crate::instruction::FileUpdate {
                    content: Some(vec![0u8; 1300].into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let tx = Transaction::new_signed(&[ix], &keypair, &[], Blockhash::ZERO).unwrap();
        assert!(matches!(
            tx.serialize(),
            Err(TransactionError::TooLarge { .. })
        ));
    }

    #[test]
    fn foreign_signer_is_refused() {
        let payer = Keypair::generate();
        let other = Keypair::generate();
        let builder = InstructionBuilder::new(SOLDRIVE_PROGRAM_ID, payer.pubkey());
        let result = Transaction::new_signed(&[builder.sign()], &payer, &[&other], Blockhash::ZERO);
        assert!(matches!(
            result,
            Err(TransactionError::UnexpectedSigner(_))
        ));
    }
}
