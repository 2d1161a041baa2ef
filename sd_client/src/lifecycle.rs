//! File Lifecycle Manager.
//!
//! A file's capacity is fixed when it is created. Content that still fits
//! is replaced in place; larger content moves the file to a new record,
//! sized to fit, under the next file id. Removal of the old record and
//! creation of the new one are submitted as one group.

use sd_core::{File, FileUpdate, LedgerError, NewFile, ProgramError};

use crate::{
    api::DriveApi,
    error::{ClientError, ClientResult},
};

/// Result of [`update_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileUpdateOutcome {
    /// Id of the file after the update.
    pub id: u32,
    /// Id the file had before the update.
    pub previous_id: u32,
    /// Whether the file was moved to a new record.
    pub recreated: bool,
}

impl FileUpdateOutcome {
    fn in_place(id: u32) -> Self {
        Self {
            id,
            previous_id: id,
            recreated: false,
        }
    }
}

/// Applies `update` to `current`, recreating the record when new content
/// exceeds its capacity.
///
/// References to the old id held elsewhere, such as a pending selection,
/// are the caller's to rewrite using the returned outcome.
pub async fn update_file<A: DriveApi + ?Sized>(
    api: &A,
    current: &File,
    update: FileUpdate,
) -> ClientResult<FileUpdateOutcome> {
    let needs_space = update
        .content
        .as_ref()
        .is_some_and(|content| !current.fits(content.len()));
    if !needs_space {
        if !update.is_empty() {
            api.update_file(current.id, update).await?;
        }
        return Ok(FileUpdateOutcome::in_place(current.id));
    }

    let replacement = merge(current, update)?;
    let id = api.replace_file(current.id, replacement).await?;
    tracing::info!(
        previous_id = current.id,
        id,
        max_size = current.max_size,
        "content outgrew its capacity"
    );
    Ok(FileUpdateOutcome {
        id,
        previous_id: current.id,
        recreated: true,
    })
}

/// Capacity a record needs to hold `len` bytes of content.
pub(crate) fn capacity_for(len: usize) -> ClientResult<u32> {
    u32::try_from(len)
        .map_err(|_| ClientError::Ledger(LedgerError::Program(ProgramError::DataSizeExceeded)))
}

/// The creation arguments for a record holding `current` with `update`
/// applied, sized exactly to the new content.
fn merge(current: &File, update: FileUpdate) -> ClientResult<NewFile> {
    let content = update.content.unwrap_or_default();
    Ok(NewFile {
        max_size: capacity_for(content.len())?,
        parent: update.parent.unwrap_or(current.parent),
        name: update.name.unwrap_or_else(|| current.name.clone()),
        file_ext: update.file_ext.unwrap_or_else(|| current.file_ext.clone()),
        file_size: update.file_size.unwrap_or(current.file_size),
        access: update.access.unwrap_or(current.access),
        backend: update.backend.unwrap_or(current.backend),
        content,
    })
}
