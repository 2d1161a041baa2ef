//! Core Soldrive types and traits.
//!
//! This crate defines the shared types and traits used by all Soldrive
//! crates.
//!
//! ## Ledger types (wire-stable)
//!
//! The following modules mirror formats defined by the deployed Soldrive
//! program and the ledger it runs on. Changing them breaks compatibility with
//! existing accounts:
//!
//! - Keys, signatures and blockhashes (`pubkey`)
//! - Derived record addresses (`address`)
//! - Account layouts and discriminators (`wire`)
//! - Program instructions and legacy transactions (`instruction`,
//!   `transaction`)
//!
//! ## Convenience APIs (non-wire)
//!
//! - Decoded records (`record::User`, `record::Folder`, `record::File`)
//! - The `Ledger` abstraction; implementations in `sd_ledger_memory` and
//!   `sd_ledger_rpc`
//! - The `ContentStore` abstraction for offloaded payloads; implementations
//!   in `sd_offload_memory` and `sd_offload_gateway`
//! - Wallet signing (`Signer`, `Keypair`)

pub mod address;
pub mod error;
pub mod instruction;
pub mod ledger;
pub mod offload;
pub mod pubkey;
pub mod record;
pub mod signer;
pub mod transaction;
pub mod wire;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use address::{AddressDeriver, AddressError, ProgramAddress, RecordKey};
pub use error::{LedgerError, ProgramError};
pub use instruction::{FileUpdate, FolderUpdate, Instruction, InstructionBuilder, NewFile};
pub use ledger::{Account, AccountFilter, Ledger, LedgerResult};
pub use offload::{ContentId, ContentStore, OffloadError};
pub use pubkey::{Blockhash, Pubkey, SOLDRIVE_PROGRAM_ID, Signature};
pub use record::{Access, Backend, File, Folder, Keyed, User};
pub use signer::{Keypair, Signer, SignerError};
pub use transaction::Transaction;
