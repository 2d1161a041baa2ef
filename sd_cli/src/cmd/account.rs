use anyhow::{Context, Result};
use sd_core::wire;

use super::CliDrive;
use crate::{
    UserCmd,
    helpers::{parse_lamports, sol_string, space_string},
};

pub async fn run_user(drive: &CliDrive, cmd: UserCmd) -> Result<()> {
    match cmd {
        UserCmd::Create => {
            drive.create_user().await?;
            drive.unlock().await?;
            println!("user created for {}", drive.encryption().owner());
        }
        UserCmd::Show => {
            println!("wallet:  {}", drive.encryption().owner());
            match drive.fetch_user().await {
                Ok(user) => {
                    println!("folders: {}", user.folder_count);
                    println!("files:   {}", user.file_count);
                    println!("space:   {}", space_string(user.space_used as u64));
                }
                Err(e) if e.is_not_found() => println!("no user yet"),
                Err(e) => return Err(e.into()),
            }
            println!("state:   {}", drive.auth_state().await);
        }
    }
    Ok(())
}

pub async fn run_airdrop(drive: &CliDrive, amount: &str) -> Result<()> {
    let lamports = parse_lamports(amount)?;
    let signature = drive.airdrop(lamports).await?;
    println!("requested {} ({signature})", sol_string(lamports));
    Ok(())
}

pub async fn run_balance(drive: &CliDrive) -> Result<()> {
    println!("{}", sol_string(drive.balance().await?));
    if let Some(offload) = drive.offload() {
        match offload.store().balance().await {
            Ok(balance) => println!("upload balance: {}", sol_string(balance)),
            Err(e) => tracing::warn!(error = %e, "could not query upload balance"),
        }
    }
    Ok(())
}

pub async fn run_cost(drive: &CliDrive, bytes: u64) -> Result<()> {
    let max_size = u32::try_from(bytes).context("files are limited to 4 GB of capacity")?;
    let rent = drive.rent(wire::file_space(max_size)).await?;
    println!("{} on ledger: {}", space_string(bytes), sol_string(rent));

    if let Some(offload) = drive.offload() {
        let external = offload.store().price(bytes).await?;
        println!("{} external:  {}", space_string(bytes), sol_string(external));

        let per_mb = drive.costs_per_megabyte().await?;
        println!(
            "per MB: ledger {}, external {}",
            sol_string(per_mb.ledger),
            sol_string(per_mb.external)
        );
    }
    Ok(())
}
