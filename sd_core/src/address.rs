//! Deterministic account addressing.
//!
//! Every Soldrive record lives at a program derived address computed from a
//! namespace tag, the owner's public key and, for folders and files, the
//! little-endian record id. The same inputs always produce the same address,
//! so an address doubles as the lookup key for a record.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::pubkey::Pubkey;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Maximum number of seeds a derivation accepts.
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed.
pub const MAX_SEED_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("too many seeds: {0}")]
    TooManySeeds(usize),
    #[error("seed of {0} bytes exceeds {MAX_SEED_LEN}")]
    SeedTooLong(usize),
    #[error("derived address lies on the curve")]
    OnCurve,
    #[error("no viable bump seed found")]
    NoViableBump,
}

/// Identifies one record of an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    User,
    Folder(u32),
    File(u32),
}

impl RecordKey {
    /// The namespace tag mixed into the address.
    pub fn namespace(&self) -> &'static [u8] {
        match self {
            RecordKey::User => b"user",
            RecordKey::Folder(_) => b"folder",
            RecordKey::File(_) => b"file",
        }
    }

    pub fn id(&self) -> Option<u32> {
        match self {
            RecordKey::User => None,
            RecordKey::Folder(id) | RecordKey::File(id) => Some(*id),
        }
    }

    /// Seed list for this record under `owner`.
    pub fn seeds(&self, owner: &Pubkey) -> Vec<Vec<u8>> {
        let mut seeds = vec![self.namespace().to_vec(), owner.as_bytes().to_vec()];
        if let Some(id) = self.id() {
            seeds.push(id.to_le_bytes().to_vec());
        }
        seeds
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::User => write!(f, "user"),
            RecordKey::Folder(id) => write!(f, "folder/{id}"),
            RecordKey::File(id) => write!(f, "file/{id}"),
        }
    }
}

/// A derived address together with the bump that moved it off the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramAddress {
    pub address: Pubkey,
    pub bump: u8,
}

/// Hashes `seeds` into an address that must lie off the ed25519 curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<Pubkey, AddressError> {
    if seeds.len() > MAX_SEEDS {
        return Err(AddressError::TooManySeeds(seeds.len()));
    }
    let mut hasher = Sha256::new();
    for seed in seeds {
        if seed.len() > MAX_SEED_LEN {
            return Err(AddressError::SeedTooLong(seed.len()));
        }
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let address = Pubkey::new_from_array(hasher.finalize().into());
    if address.is_on_curve() {
        return Err(AddressError::OnCurve);
    }
    Ok(address)
}

/// Searches bumps from 255 downward and returns the first off-curve address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<ProgramAddress> {
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Some(ProgramAddress { address, bump }),
            Err(AddressError::OnCurve) => continue,
            Err(_) => return None,
        }
    }
    None
}

/// Derives the address of `key` owned by `owner` under `program_id`.
pub fn derive(
    program_id: &Pubkey,
    owner: &Pubkey,
    key: RecordKey,
) -> Result<ProgramAddress, AddressError> {
    let seeds = key.seeds(owner);
    let refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
    find_program_address(&refs, program_id).ok_or(AddressError::NoViableBump)
}

/// Address derivation bound to a program and an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDeriver {
    pub program_id: Pubkey,
    pub owner: Pubkey,
}

impl AddressDeriver {
    pub fn new(program_id: Pubkey, owner: Pubkey) -> Self {
        Self { program_id, owner }
    }

    pub fn derive(&self, key: RecordKey) -> Result<ProgramAddress, AddressError> {
        let derived = derive(&self.program_id, &self.owner, key)?;
        tracing::trace!(%key, address = %derived.address, "derived address");
        Ok(derived)
    }

    pub fn user(&self) -> Result<Pubkey, AddressError> {
        Ok(self.derive(RecordKey::User)?.address)
    }

    pub fn folder(&self, id: u32) -> Result<Pubkey, AddressError> {
        Ok(self.derive(RecordKey::Folder(id))?.address)
    }

    pub fn file(&self, id: u32) -> Result<Pubkey, AddressError> {
        Ok(self.derive(RecordKey::File(id))?.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubkey::SOLDRIVE_PROGRAM_ID;

    fn owner() -> Pubkey {
        Pubkey::new_from_array([7u8; 32])
    }

    #[test]
    fn derivation_is_deterministic() {
        for key in [RecordKey::User, RecordKey::Folder(1), RecordKey::File(42)] {
            let a = derive(&SOLDRIVE_PROGRAM_ID, &owner(), key).unwrap();
            let b = derive(&SOLDRIVE_PROGRAM_ID, &owner(), key).unwrap();
            assert_eq!(a, b);
            assert!(!a.address.is_on_curve());
        }
    }

    #[test]
    fn namespaces_and_ids_do_not_collide() {
        let deriver = AddressDeriver::new(SOLDRIVE_PROGRAM_ID, owner());
        let folder = deriver.folder(1).unwrap();
        let file = deriver.file(1).unwrap();
        let file2 = deriver.file(2).unwrap();
        let user = deriver.user().unwrap();
        assert_ne!(folder, file);
        assert_ne!(file, file2);
        assert_ne!(user, folder);

        let other = AddressDeriver::new(SOLDRIVE_PROGRAM_ID, Pubkey::new_from_array([8u8; 32]));
        assert_ne!(other.file(1).unwrap(), file);
    }

    #[test]
    fn matches_published_chain_addresses() {
        let program_id: Pubkey = "BPFLoaderUpgradeab1e11111111111111111111111".parse().unwrap();
        let seed_key: Pubkey = "SeedPubey1111111111111111111111111111111111".parse().unwrap();
        let expect = |seeds: &[&[u8]], address: &str| {
            assert_eq!(
                create_program_address(seeds, &program_id).unwrap(),
                address.parse::<Pubkey>().unwrap()
            );
        };
        expect(&[b"", &[1]], "BwqrghZA2htAcqq8dzP1WDAhTXYTYWj7CHxF5j7TDBAe");
        expect(&["☉".as_bytes(), &[0]], "13yWmRpaTR4r5nAktwLqMpRNr28tnVUZw26rTvPSSB19");
        expect(&[b"Talking", b"Squirrels"], "2fnQrngrQT4SeLcdToJAD96phoEjNL2man2kfRLCASVk");
        expect(&[seed_key.as_bytes(), &[1]], "976ymqVnfE32QFe6NfGDctSvVa36LWnvYxhU6G2232YL");

        assert!(matches!(
            create_program_address(&[&[127; MAX_SEED_LEN + 1]], &program_id),
            Err(AddressError::SeedTooLong(_))
        ));
        assert!(create_program_address(&[&[0; MAX_SEED_LEN]], &program_id).is_ok());
    }

    #[test]
    fn seeds_use_little_endian_ids() {
        let seeds = RecordKey::Folder(0x0102_0304).seeds(&owner());
        assert_eq!(seeds.len(), 3);
        assert_eq!(seeds[0], b"folder");
        assert_eq!(seeds[2], vec![4, 3, 2, 1]);
        assert_eq!(RecordKey::User.seeds(&owner()).len(), 2);
    }

    #[test]
    fn found_address_matches_direct_creation() {
        let owner = owner();
        let found = find_program_address(
            &[b"user".as_slice(), owner.as_bytes().as_slice()],
            &SOLDRIVE_PROGRAM_ID,
        )
        .unwrap();
        let created = create_program_address(
            &[b"user".as_slice(), owner.as_bytes().as_slice(), &[found.bump]],
            &SOLDRIVE_PROGRAM_ID,
        )
        .unwrap();
        assert_eq!(found.address, created);
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let long = [0u8; 33];
        assert_eq!(
            create_program_address(&[long.as_slice()], &SOLDRIVE_PROGRAM_ID),
            Err(AddressError::SeedTooLong(33))
        );
    }
}
