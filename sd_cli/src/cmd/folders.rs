use anyhow::Result;
use sd_client::{FileEntry, FolderEdit};

use super::{CliDrive, signed_in};
use crate::helpers::space_string;

pub fn display_name(file: &FileEntry) -> String {
    if file.file_ext.is_empty() {
        file.name.clone()
    } else {
        format!("{}.{}", file.name, file.file_ext)
    }
}

pub async fn run_ls(drive: &CliDrive, folder: u32) -> Result<()> {
    signed_in(drive).await?;
    let listing = drive.fetch_children(folder, false).await?;
    let mut folders = listing.folders;
    folders.sort_by(|a, b| a.name.cmp(&b.name));
    let mut files = listing.files;
    files.sort_by(|a, b| a.name.cmp(&b.name));

    for f in &folders {
        println!("d {:>6}  {:>10}  {:<15}  {}/", f.id, "-", "", f.name);
    }
    for f in &files {
        println!(
            "- {:>6}  {:>10}  {:<15}  {} [{}]",
            f.id,
            space_string(f.file_size),
            f.access.as_str(),
            display_name(f),
            f.backend
        );
    }
    if folders.is_empty() && files.is_empty() {
        println!("(empty)");
    }
    Ok(())
}

pub async fn run_mkdir(drive: &CliDrive, name: &str, parent: u32) -> Result<()> {
    signed_in(drive).await?;
    let id = drive.create_folder(parent, name).await?;
    println!("created folder {id}");
    Ok(())
}

pub async fn run_rename_folder(drive: &CliDrive, id: u32, name: String) -> Result<()> {
    signed_in(drive).await?;
    drive
        .update_folder(
            id,
            FolderEdit {
                name: Some(name),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

pub async fn run_rmdir(drive: &CliDrive, id: u32) -> Result<()> {
    signed_in(drive).await?;
    let listing = drive.fetch_children(id, false).await?;
    if !listing.folders.is_empty() || !listing.files.is_empty() {
        anyhow::bail!(
            "folder {id} is not empty ({} folders, {} files)",
            listing.folders.len(),
            listing.files.len()
        );
    }
    drive.remove_folder(id).await?;
    Ok(())
}
