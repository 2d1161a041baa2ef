use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use sd_client::{CachedDrive, Drive, LedgerClient, Offload};
use sd_core::Signer;
use sd_ledger_rpc::RpcLedger;
use sd_offload_gateway::GatewayStore;

use crate::{DriveCmd, config::SoldriveConfig};

mod account;
mod files;
mod folders;

pub use account::{run_airdrop, run_balance, run_cost, run_user};
pub use files::{run_get, run_mv, run_put, run_rm, run_update};
pub use folders::{run_ls, run_mkdir, run_rename_folder, run_rmdir};

pub type CliDrive = Drive<CachedDrive<LedgerClient<RpcLedger>>>;

/// Builds the drive described by the profile.
pub fn open_drive(profile_file: &Path) -> Result<CliDrive> {
    let config = SoldriveConfig::load(profile_file)?;
    let keypair = config.load_keypair(profile_file)?;
    let owner = keypair.pubkey();
    let rpc = config.ledger.rpc_config();
    tracing::debug!(url = %rpc.url, "using ledger");

    let mut drive = Drive::open(
        RpcLedger::new(rpc),
        Arc::new(keypair),
        config.ledger.program_id()?,
        &config.encryption,
    );
    if let Some(offload) = &config.offload {
        let gateway = offload.gateway_config(config.ledger.cluster(), &owner);
        tracing::debug!(node = %gateway.node_url, policy = %offload.policy(), "using offload");
        drive = drive.with_offload(Offload::new(
            Arc::new(GatewayStore::new(gateway)),
            offload.policy(),
        ));
    }
    Ok(drive)
}

/// Signs in and makes sure the encryption keys are loaded.
pub async fn signed_in(drive: &CliDrive) -> Result<()> {
    drive
        .login()
        .await
        .context("no user for this wallet, run `soldrive user create` first")?;
    if !drive.encryption().is_unlocked() {
        drive.unlock().await.context("could not unlock encryption")?;
    }
    Ok(())
}

pub async fn run_command(profile_file: &Path, cmd: DriveCmd) -> Result<()> {
    let drive = open_drive(profile_file)?;
    match cmd {
        DriveCmd::User { cmd } => run_user(&drive, cmd).await,
        DriveCmd::Airdrop { amount } => run_airdrop(&drive, &amount).await,
        DriveCmd::Balance => run_balance(&drive).await,
        DriveCmd::Cost { bytes } => run_cost(&drive, bytes).await,
        DriveCmd::Ls { folder } => run_ls(&drive, folder).await,
        DriveCmd::Mkdir { name, parent } => run_mkdir(&drive, &name, parent).await,
        DriveCmd::RenameFolder { id, name } => run_rename_folder(&drive, id, name).await,
        DriveCmd::Rmdir { id } => run_rmdir(&drive, id).await,
        DriveCmd::Put {
            path,
            parent,
            access,
            max_size,
            backend,
        } => {
            run_put(
                &drive,
                files::PutOptions {
                    path,
                    parent,
                    access,
                    max_size,
                    backend,
                },
            )
            .await
        }
        DriveCmd::Get { id, out } => run_get(&drive, id, out).await,
        DriveCmd::Update {
            id,
            name,
            access,
            content,
        } => run_update(&drive, id, name, access, content).await,
        DriveCmd::Rm { id } => run_rm(&drive, id).await,
        DriveCmd::Mv { files, folders, to } => run_mv(&drive, &files, &folders, to).await,
    }
}
