use crate::{
    deployment::{
        DEPLOYMENTS_ROOT,
        DeploymentEnv,
        DeploymentStore,
    },
    remote::Address,
};
use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_LOCAL_GATEWAY_URL: &str = "http://localhost:8545/relay";
pub const DEFAULT_TESTNET_GATEWAY_URL: &str = "https://testnet.lottery-relay.xyz";
pub const DEFAULT_MAINNET_GATEWAY_URL: &str = "https://mainnet.lottery-relay.xyz";

#[derive(Parser, Clone, Debug)]
#[command(
    name = "lottery-client",
    about = "Buy lottery tickets and run draws against the on-chain lottery contract"
)]
pub struct Cli {
    /// Network whose gateway and deployment records to use
    #[arg(long, value_enum, default_value = "local")]
    pub network: DeploymentEnv,
    /// Override the gateway URL for the selected network
    #[arg(long)]
    pub gateway_url: Option<String>,
    /// Lottery contract address; defaults to the latest recorded deployment
    #[arg(long, env = "LOTTERY_CONTRACT_ADDRESS")]
    pub contract: Option<String>,
    /// Connected wallet address; omit to browse without a wallet
    #[arg(long, env = "LOTTERY_CALLER_ADDRESS")]
    pub address: Option<String>,
    /// Milliseconds between background refreshes of every remote value
    #[arg(long, default_value_t = 4_000)]
    pub poll_interval_ms: u64,
    /// Currency symbol shown next to amounts
    #[arg(long, default_value = "ETH")]
    pub currency: String,
    /// Decimal places of the currency's smallest unit
    #[arg(long, default_value_t = 18)]
    pub decimals: u32,
    #[arg(long, default_value = "~/.lottery-client/logs")]
    pub log_dir: String,
    #[arg(long, default_value = DEPLOYMENTS_ROOT)]
    pub deployments_dir: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: DeploymentEnv,
    pub gateway_url: String,
    pub contract: Address,
    pub caller: Option<Address>,
    pub poll_interval: Duration,
    pub display: DisplayConfig,
    pub log_dir: PathBuf,
}

/// How amounts are rendered. Display only.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisplayConfig {
    pub currency: String,
    pub decimals: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency: String::from("ETH"),
            decimals: 18,
        }
    }
}

pub fn default_gateway_url(network: DeploymentEnv) -> &'static str {
    match network {
        DeploymentEnv::Local => DEFAULT_LOCAL_GATEWAY_URL,
        DeploymentEnv::Testnet => DEFAULT_TESTNET_GATEWAY_URL,
        DeploymentEnv::Mainnet => DEFAULT_MAINNET_GATEWAY_URL,
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl Cli {
    pub fn resolve(self) -> Result<AppConfig> {
        if self.poll_interval_ms == 0 {
            return Err(eyre!("--poll-interval-ms must be greater than zero"));
        }
        if self.decimals > 38 {
            return Err(eyre!("--decimals must be at most 38"));
        }

        let contract = match self.contract.as_deref() {
            Some(raw) => raw
                .parse::<Address>()
                .wrap_err("invalid --contract address")?,
            None => {
                let store =
                    DeploymentStore::new(expand_path(&self.deployments_dir), self.network)?;
                let record = store.latest()?.ok_or_else(|| {
                    eyre!(
                        "No contract given and no deployment recorded for {} in {}",
                        self.network,
                        store.path().display()
                    )
                })?;
                record
                    .contract_address
                    .parse::<Address>()
                    .wrap_err("invalid contract address in deployment records")?
            }
        };

        let caller = self
            .address
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()
            .wrap_err("invalid --address")?;

        Ok(AppConfig {
            network: self.network,
            gateway_url: self
                .gateway_url
                .unwrap_or_else(|| default_gateway_url(self.network).to_string()),
            contract,
            caller,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            display: DisplayConfig {
                currency: self.currency,
                decimals: self.decimals,
            },
            log_dir: expand_path(&self.log_dir),
        })
    }
}
