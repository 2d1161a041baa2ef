use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use clap::Subcommand;
use sd_core::{Keypair, SOLDRIVE_PROGRAM_ID, Signer};
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;

use crate::config::Cluster;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the profile if it doesn't exist and generates a wallet keypair
    Init {
        /// Cluster the profile talks to
        #[arg(long, value_enum, default_value = "devnet")]
        cluster: ClusterArg,
        /// Also route large files to the external storage network
        #[arg(long)]
        offload: bool,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum ClusterArg {
    Mainnet,
    Devnet,
    Localnet,
}

impl From<ClusterArg> for Cluster {
    fn from(arg: ClusterArg) -> Self {
        match arg {
            ClusterArg::Mainnet => Cluster::Mainnet,
            ClusterArg::Devnet => Cluster::Devnet,
            ClusterArg::Localnet => Cluster::Localnet,
        }
    }
}

fn table<'a>(doc: &'a mut DocumentMut, key: &str) -> anyhow::Result<&'a mut Table> {
    doc.entry(key)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .ok_or_else(|| anyhow!("`{key}` in profile is not a table"))
}

impl CmdConfig {
    pub fn run(self, profile_file: &Path) -> anyhow::Result<()> {
        let mut doc = if profile_file.exists() {
            fs::read_to_string(profile_file)?
        } else {
            if let Some(dir) = profile_file.parent() {
                fs::create_dir_all(dir)?;
            }
            String::new()
        }
        .parse::<DocumentMut>()
        .context("could not parse profile")?;

        match self {
            Self::Init { cluster, offload } => {
                let keypair_file = profile_file.with_extension("keypair");
                let keypair_name = keypair_file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .context("profile path has no file name")?
                    .to_owned();

                let wallet = table(&mut doc, "wallet")?;
                if !wallet.contains_key("keypair_file") {
                    wallet.insert("keypair_file", value(keypair_name));
                }

                let cluster = Cluster::from(cluster);
                let ledger = table(&mut doc, "ledger")?;
                ledger.insert("type", value("rpc"));
                ledger.insert("cluster", value(cluster_name(cluster)));
                if !ledger.contains_key("program_id") {
                    ledger.insert("program_id", value(SOLDRIVE_PROGRAM_ID.to_string()));
                }

                if offload {
                    let offload = table(&mut doc, "offload")?;
                    offload.insert("type", value("gateway"));
                    if !offload.contains_key("policy") {
                        offload.insert("policy", value("cheapest"));
                    }
                }

                table(&mut doc, "encryption")?;

                if !keypair_file.exists() {
                    info!("generating wallet keypair");
                    let keypair = Keypair::generate();
                    fs::write(&keypair_file, keypair.secret_bytes())?;
                    info!(address = %keypair.pubkey(), "wallet created");
                }
            }
        }

        info!("writing to profile {profile_file:?}");
        write_atomic(profile_file, doc.to_string().as_bytes())
    }
}

fn cluster_name(cluster: Cluster) -> &'static str {
    match cluster {
        Cluster::Mainnet => "mainnet",
        Cluster::Devnet => "devnet",
        Cluster::Localnet => "localnet",
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let tmp_path: PathBuf = path.with_extension("tmp");
    let mut tmp = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    tmp.write_all(contents)?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoldriveConfig;

    #[test]
    fn init_writes_a_loadable_profile() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("profiles").join("local.toml");

        CmdConfig::Init {
            cluster: ClusterArg::Localnet,
            offload: true,
        }
        .run(&profile)
        .unwrap();

        let config = SoldriveConfig::load(&profile).unwrap();
        assert_eq!(config.ledger.cluster(), Cluster::Localnet);
        assert_eq!(config.ledger.program_id().unwrap(), SOLDRIVE_PROGRAM_ID);
        assert!(config.offload.is_some());
        let keypair = config.load_keypair(&profile).unwrap();

        // a second init keeps the wallet
        CmdConfig::Init {
            cluster: ClusterArg::Devnet,
            offload: false,
        }
        .run(&profile)
        .unwrap();
        let config = SoldriveConfig::load(&profile).unwrap();
        assert_eq!(config.ledger.cluster(), Cluster::Devnet);
        assert_eq!(config.load_keypair(&profile).unwrap().pubkey(), keypair.pubkey());
        assert!(!profile.with_extension("tmp").exists());
    }

    #[test]
    fn edits_keep_user_comments() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("dev.toml");
        fs::write(
            &profile,
            "# my profile\n[ledger]\ntype = \"rpc\"\nurl = \"http://localhost:9000\"\n",
        )
        .unwrap();

        CmdConfig::Init {
            cluster: ClusterArg::Devnet,
            offload: false,
        }
        .run(&profile)
        .unwrap();

        let text = fs::read_to_string(&profile).unwrap();
        assert!(text.contains("# my profile"));
        let config = SoldriveConfig::load(&profile).unwrap();
        assert_eq!(config.ledger.rpc_config().url, "http://localhost:9000");
        assert!(dir.path().join("dev.keypair").exists());
    }
}
