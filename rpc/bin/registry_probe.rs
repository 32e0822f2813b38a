//! Command-line runner for the registry probe
//!
//! Exit status: 0 when no defect was found, 1 when any scenario produced a
//! defect, 2 when the run could not evaluate the registry at all.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use registry_probe::{run_probe, Address, ProbeConfig, ProbeReport, SimulatedRegistry};
use registry_probe_rpc::JsonRpcLedger;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Accounts in the simulated registry's pool
const SIMULATED_POOL_SIZE: usize = 10;

fn build_cli() -> Command {
    Command::new("registry-probe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run adversarial scenarios against a deployed reporting registry")
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("TOML configuration file"))
        .arg(Arg::new("rpc-url")
            .long("rpc-url")
            .value_name("URL")
            .help("Node JSON-RPC endpoint"))
        .arg(Arg::new("registry")
            .long("registry")
            .value_name("ADDRESS")
            .help("Deployed registry address"))
        .arg(Arg::new("gas-limit")
            .long("gas-limit")
            .value_name("GAS")
            .value_parser(clap::value_parser!(u64))
            .help("Fixed gas limit supplied on every commit"))
        .arg(Arg::new("gas-price-gwei")
            .long("gas-price-gwei")
            .value_name("GWEI")
            .value_parser(clap::value_parser!(u64))
            .help("Gas price assumed by the flood cost estimate"))
        .arg(Arg::new("exchange-rate")
            .long("exchange-rate")
            .value_name("RATE")
            .value_parser(clap::value_parser!(f64))
            .help("Fiat value of one base unit for the flood cost estimate"))
        .arg(Arg::new("simulated")
            .long("simulated")
            .help("Run against the in-memory registry instead of a node")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("json")
            .long("json")
            .help("Print the report as JSON")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .help("Also write the JSON report to FILE"))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<ProbeConfig> {
    let path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = ProbeConfig::load(path.as_deref())?;

    if let Some(url) = matches.get_one::<String>("rpc-url") {
        config = config.with_rpc_url(url.clone());
    }
    if let Some(registry) = matches.get_one::<String>("registry") {
        let address: Address = registry
            .parse()
            .map_err(|e| anyhow!("invalid --registry {}: {}", registry, e))?;
        config = config.with_registry_address(address);
    }
    if let Some(gas) = matches.get_one::<u64>("gas-limit") {
        config.gas.commit_gas_limit = *gas;
    }
    if let Some(gwei) = matches.get_one::<u64>("gas-price-gwei") {
        config.economics = config.economics.with_gas_price_gwei(*gwei);
    }
    if let Some(rate) = matches.get_one::<f64>("exchange-rate") {
        config.economics = config.economics.with_exchange_rate(*rate);
    }
    Ok(config)
}

async fn run(matches: &ArgMatches) -> anyhow::Result<ProbeReport> {
    let config = load_config(matches)?;

    let report = if matches.get_flag("simulated") {
        let clock = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        info!("Running against the simulated registry");
        let ledger = SimulatedRegistry::with_dev_accounts(SIMULATED_POOL_SIZE, clock);
        run_probe(&ledger, config).await?
    } else {
        info!(
            "Running against registry {} at {}",
            config.network.registry_address, config.network.rpc_url
        );
        let ledger = JsonRpcLedger::from_config(&config).context("failed to set up the ledger client")?;
        run_probe(&ledger, config).await?
    };

    if let Some(path) = matches.get_one::<String>("output") {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("failed to write report to {}", path))?;
        info!("Report written to {}", path);
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();

    let report = match run(&matches).await {
        Ok(report) => report,
        Err(err) => {
            error!("Probe aborted: {:#}", err);
            return ExitCode::from(2);
        }
    };

    if matches.get_flag("json") {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                error!("Failed to serialize report: {}", err);
                return ExitCode::from(2);
            }
        }
    } else {
        println!("{}", report.summary());
    }

    if report.has_defects() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let matches = build_cli().get_matches_from([
            "registry-probe",
            "--rpc-url",
            "http://10.0.0.2:8545",
            "--registry",
            "0x00000000000000000000000000000000000000bb",
            "--gas-price-gwei",
            "100",
            "--gas-limit",
            "500000",
        ]);
        let config = load_config(&matches).unwrap();
        assert_eq!(config.network.rpc_url, "http://10.0.0.2:8545");
        assert_eq!(config.network.registry_address.as_bytes()[19], 0xbb);
        assert_eq!(config.economics.gas_price_gwei, 100);
        assert_eq!(config.gas.commit_gas_limit, 500_000);
        assert!(!matches.get_flag("simulated"));
    }

    #[test]
    fn test_bad_registry_rejected() {
        let matches = build_cli().get_matches_from(["registry-probe", "--registry", "0x12"]);
        assert!(load_config(&matches).is_err());
    }

    #[tokio::test]
    async fn test_simulated_run_has_no_defects() {
        let matches = build_cli().get_matches_from(["registry-probe", "--simulated"]);
        let report = run(&matches).await.unwrap();
        assert!(!report.has_defects());
    }
}
