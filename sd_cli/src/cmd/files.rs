use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use sd_client::{FileEdit, NewEntry, OffloadPolicy};
use sd_core::{Access, wire::EXT_MAX_LEN};

use super::{CliDrive, folders::display_name, signed_in};
use crate::helpers::space_string;

pub struct PutOptions {
    pub path: PathBuf,
    pub parent: u32,
    pub access: String,
    pub max_size: Option<u32>,
    pub backend: Option<String>,
}

fn parse_access(s: &str) -> Result<Access> {
    Access::from_str(s).with_context(|| format!("invalid access '{s}'"))
}

fn parse_policy(s: &str) -> Result<OffloadPolicy> {
    OffloadPolicy::from_str(s).map_err(|e| anyhow!(e))
}

/// Splits a local file name into the stored name and extension.
fn split_name(path: &std::path::Path) -> Result<(String, String)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{path:?} has no usable file name"))?;
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= EXT_MAX_LEN => {
            Ok((stem.to_owned(), ext.to_owned()))
        }
        _ => Ok((file_name.to_owned(), String::new())),
    }
}

async fn read_local(path: &std::path::Path) -> Result<Bytes> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("could not read {path:?}"))?;
    Ok(Bytes::from(data))
}

pub async fn run_put(drive: &CliDrive, opts: PutOptions) -> Result<()> {
    let (name, file_ext) = split_name(&opts.path)?;
    let access = parse_access(&opts.access)?;
    let policy = opts.backend.as_deref().map(parse_policy).transpose()?;
    let content = read_local(&opts.path).await?;
    let len = content.len() as u64;

    signed_in(drive).await?;
    let id = drive
        .create_file(NewEntry {
            parent: opts.parent,
            name,
            file_ext,
            access,
            content,
            max_size: opts.max_size,
            policy,
        })
        .await?;
    println!("uploaded {} as file {id}", space_string(len));
    Ok(())
}

pub async fn run_get(drive: &CliDrive, id: u32, out: Option<PathBuf>) -> Result<()> {
    signed_in(drive).await?;
    let entry = drive.fetch_file(id, true).await?;
    let content = drive.download(&entry).await?;
    let out = out.unwrap_or_else(|| PathBuf::from(display_name(&entry)));
    tokio::fs::write(&out, &content)
        .await
        .with_context(|| format!("could not write {out:?}"))?;
    println!("wrote {} to {}", space_string(content.len() as u64), out.display());
    Ok(())
}

pub async fn run_update(
    drive: &CliDrive,
    id: u32,
    name: Option<String>,
    access: Option<String>,
    content: Option<PathBuf>,
) -> Result<()> {
    let access = access.as_deref().map(parse_access).transpose()?;
    let content = match content {
        Some(path) => Some(read_local(&path).await?),
        None => None,
    };

    signed_in(drive).await?;
    let outcome = drive
        .update_file(
            id,
            FileEdit {
                name,
                access,
                content,
                ..Default::default()
            },
        )
        .await?;
    if outcome.recreated {
        println!(
            "file {} outgrew its capacity and is now file {}",
            outcome.previous_id, outcome.id
        );
    } else {
        println!("updated file {id}");
    }
    Ok(())
}

pub async fn run_rm(drive: &CliDrive, id: u32) -> Result<()> {
    drive.remove_file(id).await?;
    println!("removed file {id}");
    Ok(())
}

pub async fn run_mv(drive: &CliDrive, files: &[u32], folders: &[u32], to: u32) -> Result<()> {
    if folders.contains(&to) {
        anyhow::bail!("cannot move folder {to} into itself");
    }
    drive.move_items(files, folders, to).await?;
    println!(
        "moved {} files and {} folders to {to}",
        files.len(),
        folders.len()
    );
    Ok(())
}
