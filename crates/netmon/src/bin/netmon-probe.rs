//! netmon-probe
//!
//! Runs the validation engine once against the host's real network and
//! prints the verdict, or exercises individual probe helpers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use netmon::config::{ConfigStore, InMemoryConfig, MonitorSettings};
use netmon::logging::{self, LogFormat};
use netmon::probe::capport::fetch_capport;
use netmon::probe::spec::FallbackSpec;
use netmon::transport::ReqwestHttpClient;
use netmon::{
    Dependencies, LinkProperties, MonitorEvent, NetworkCapabilities, NetworkId, NetworkMonitor,
    PrivateDnsConfig, Transport,
};
use reqwest::Url;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "netmon-probe")]
#[command(about = "Network validation probe runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Static monitor settings (YAML or JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dynamic key/value settings (YAML map).
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full evaluation and print the result as JSON.
    Validate {
        #[arg(long, value_enum, default_value = "wifi")]
        transport: TransportArg,

        #[arg(long)]
        metered: bool,

        /// Captive portal API URL advertised by the network.
        #[arg(long)]
        capport_url: Option<String>,

        /// Strict-mode private DNS hostname.
        #[arg(long)]
        private_dns: Option<String>,

        /// Give up after this many seconds.
        #[arg(long, default_value = "60")]
        deadline: u64,
    },

    /// Query a captive portal API endpoint.
    Capport {
        url: String,

        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Parse a fallback probe spec list.
    Specs { raw: String },

    /// Print the effective static settings as YAML.
    Settings,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
    Wifi,
    Cellular,
    Ethernet,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Wifi => Transport::Wifi,
            TransportArg::Cellular => Transport::Cellular,
            TransportArg::Ethernet => Transport::Ethernet,
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<MonitorSettings> {
    match path {
        Some(path) => MonitorSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(MonitorSettings::default()),
    }
}

fn load_store(path: Option<&PathBuf>) -> Result<InMemoryConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            InMemoryConfig::from_yaml_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
        None => Ok(InMemoryConfig::new()),
    }
}

async fn run_validate(
    settings: MonitorSettings,
    store: InMemoryConfig,
    capabilities: NetworkCapabilities,
    link: LinkProperties,
    private_dns: Option<String>,
    deadline: Duration,
) -> Result<()> {
    let store: Arc<dyn ConfigStore> = Arc::new(store);
    let deps = Dependencies::system(store, settings.http_probe_timeout)?;
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let monitor = NetworkMonitor::spawn(NetworkId(100), deps, settings, tx);

    if let Some(hostname) = private_dns {
        monitor.notify_private_dns_settings_changed(PrivateDnsConfig::Strict { hostname });
    }
    monitor.notify_network_connected(link, capabilities);

    let mut events = Vec::new();
    let result = tokio::time::timeout(deadline, async {
        while let Some(event) = rx.recv().await {
            match event {
                MonitorEvent::NetworkTested(result) => return Some(result),
                other => {
                    debug!("Event: {:?}", other);
                    events.push(other);
                }
            }
        }
        None
    })
    .await
    .context("Evaluation did not finish before the deadline")?
    .context("Monitor stopped before reporting")?;

    let status = monitor.status().await;
    monitor.notify_network_disconnected();

    let sign_in = events.iter().find_map(|e| match e {
        MonitorEvent::ShowSignInNotification { redirect_url, .. } => Some(redirect_url.clone()),
        _ => None,
    });
    let output = json!({
        "result": result,
        "verdict": result.result.to_string(),
        "sign_in": sign_in,
        "status": status,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init(&cli.log_level, format)?;

    let settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Commands::Validate {
            transport,
            metered,
            capport_url,
            private_dns,
            deadline,
        } => {
            let store = load_store(cli.store.as_ref())?;
            let mut capabilities = NetworkCapabilities::internet(vec![transport.into()]);
            capabilities.not_metered = !metered;
            let link = match capport_url {
                Some(url) => LinkProperties::with_capport_url(url),
                None => LinkProperties::default(),
            };
            info!("Validating {} network", Transport::from(transport));
            run_validate(
                settings,
                store,
                capabilities,
                link,
                private_dns,
                Duration::from_secs(deadline),
            )
            .await?;
        }
        Commands::Capport { url, timeout } => {
            let url = Url::parse(&url).context("Invalid capport URL")?;
            let client = ReqwestHttpClient::new(Duration::from_secs(timeout))?;
            match fetch_capport(&client, &url, Duration::from_secs(timeout), chrono::Utc::now())
                .await
            {
                Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                None => anyhow::bail!("No usable capport data from {}", url),
            }
        }
        Commands::Specs { raw } => {
            let specs = FallbackSpec::parse_list(&raw);
            if specs.is_empty() {
                warn!("No valid specs in input");
            }
            for spec in specs {
                println!("{}", spec);
            }
        }
        Commands::Settings => {
            print!("{}", serde_yaml::to_string(&settings)?);
        }
    }

    Ok(())
}
