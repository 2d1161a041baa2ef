//! Soldrive client.
//!
//! The layers stack bottom-up:
//!
//! - [`LedgerClient`] turns [`DriveApi`] calls into program instructions
//!   and account scans on any [`sd_core::Ledger`]
//! - [`CachedDrive`] decorates a `DriveApi` with an explicit [`ReadCache`]
//! - [`Drive`] encrypts and decrypts names and content with the owner's
//!   wallet-derived keys and routes large payloads to a
//!   [`sd_core::ContentStore`]
//!
//! File updates that outgrow a file's capacity are handled by
//! [`lifecycle::update_file`]; moves of many items at once by
//! [`batch::move_items`] and [`Selection`].
//!
//! ```ignore
//! let signer = Arc::new(Keypair::generate());
//! let drive = Drive::open(ledger, signer, SOLDRIVE_PROGRAM_ID, &EncryptionConfig::default());
//! drive.create_user().await?;
//! drive.unlock().await?;
//! let folder = drive.create_folder(ROOT, "docs").await?;
//! ```

pub mod api;
pub mod batch;
pub mod cache;
pub mod crypto;
pub mod drive;
pub mod encryption;
pub mod error;
pub mod lifecycle;
pub mod offload;
pub mod raw;
pub mod session;

pub use api::{Children, DriveApi, FileQuery};
pub use batch::{ItemKind, Selection, SelectionItem, move_items};
pub use cache::{CachedDrive, ReadCache};
pub use drive::{
    AuthState, Drive, FileEdit, FileEntry, FolderEdit, FolderEntry, Listing, NewEntry, auth_state,
};
pub use encryption::{Encryption, EncryptionConfig, LockState};
pub use error::{ClientError, ClientResult, CryptoError, ErrorKind};
pub use lifecycle::FileUpdateOutcome;
pub use offload::{MegabyteCosts, Offload, OffloadPolicy};
pub use raw::LedgerClient;
pub use session::{MemorySessionStore, SessionStore};
