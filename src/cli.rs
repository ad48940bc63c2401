use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::ca::{CaError, CaStore};
use crate::settings::{Overrides, ProxySpec, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "sooproxy", version)]
#[command(about = "Local development reverse proxy with path-prefix routing and automatic HTTPS", long_about = None)]
pub struct Cli {
    /// Path to the YAML (or .toml) configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Host name to listen on (also the certificate common name)
    #[arg(short = 'H', long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on. 443 enables TLS
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Route in PREFIX::TARGET form, e.g. /api::http://localhost:3000
    #[arg(short = 'P', long = "proxies", value_name = "PREFIX::TARGET")]
    pub proxies: Vec<ProxySpec>,

    /// Serve over TLS with a certificate issued by the local CA
    #[arg(short, long)]
    pub secure: bool,

    /// Directory holding ca.pem and ca.key (default ~/.sooproxy)
    #[arg(long, env = "SOOPROXY_CA_DIR", global = true)]
    pub ca_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Install the CA certificate into the OS trust store, generating it if missing
    #[command(visible_alias = "t")]
    CaTrust,
    /// Generate a new CA pair and install it
    #[command(visible_alias = "g")]
    CaGen,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config_file: self.config.clone(),
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            proxies: self.proxies.clone(),
        }
    }

    pub fn ca_store(&self) -> Result<CaStore, CaError> {
        match &self.ca_dir {
            Some(dir) => Ok(CaStore::new(dir.clone())),
            None => CaStore::from_home(),
        }
    }
}
