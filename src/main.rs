//! tcpip-forward command line tool
//!
//! Resolves the layered forwarding configuration, shows where every value
//! came from and optionally checks that the permitted bind rules can be
//! listened on.

use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use tokio::net::TcpListener;

use tcpip_forward::common::{init_logger, resolve_tcp_addr, Result};
use tcpip_forward::config::{AddressRule, ConfigBuilder, ConfigValues, ForwardConfig, ENV_PREFIX};
use tcpip_forward::forward::ForwardOptions;
use tcpip_forward::{APP_NAME, VERSION};

/// Inspect and check port forwarding configuration
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Load configuration from a JSON file
    #[clap(long)]
    config_file: Option<PathBuf>,

    /// Log level or env_logger filter
    #[clap(long)]
    log_level: Option<String>,

    /// Relay buffer size in bytes
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Local-forward dial timeout in seconds
    #[clap(long)]
    connect_timeout: Option<u64>,

    /// Accept direct-tcpip channels
    #[clap(long)]
    allow_local: bool,

    /// Accept tcpip-forward requests
    #[clap(long)]
    allow_remote: bool,

    /// Permitted local-forward destination (host:port, * allowed; repeatable)
    #[clap(long = "permit-destination")]
    permit_destinations: Vec<String>,

    /// Permitted remote-forward bind address (host:port, * allowed; repeatable)
    #[clap(long = "permit-bind")]
    permit_binds: Vec<String>,

    /// Bind every permitted bind rule once to check it is usable
    #[clap(long)]
    probe: bool,
}

impl Args {
    /// Only flags given on the command line override other sources
    fn to_values(&self) -> ConfigValues {
        ConfigValues {
            log_level: self.log_level.clone(),
            buffer_size: self.buffer_size,
            connect_timeout: self.connect_timeout,
            allow_local_forwarding: self.allow_local.then_some(true),
            allow_remote_forwarding: self.allow_remote.then_some(true),
            permitted_destinations: (!self.permit_destinations.is_empty()).then(|| self.permit_destinations.clone()),
            permitted_binds: (!self.permit_binds.is_empty()).then(|| self.permit_binds.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ConfigBuilder::new().with_defaults();
    if let Some(path) = &args.config_file {
        builder = builder.with_file(path);
    }
    let config = builder.with_env(ENV_PREFIX).with_cli(args.to_values()).build()?;

    init_logger(config.log_level());
    info!("Starting {} v{}", APP_NAME, VERSION);

    print_config(&config);

    let options = ForwardOptions::from_config(&config)?;
    info!("Forwarding options: {:?}", options);

    if args.probe {
        probe_binds(&config).await?;
    }

    Ok(())
}

fn print_config(config: &ForwardConfig) {
    println!("{} v{}", APP_NAME, VERSION);
    if let Some(path) = &config.config_file {
        println!("  config file: {}", path.display());
    }

    let rows = [
        ("log_level", config.log_level().to_string()),
        ("buffer_size", config.buffer_size().to_string()),
        ("connect_timeout", format!("{}s", config.connect_timeout().as_secs())),
        ("allow_local_forwarding", config.allow_local_forwarding().to_string()),
        ("allow_remote_forwarding", config.allow_remote_forwarding().to_string()),
        ("permitted_destinations", format_rules(config.permitted_destinations())),
        ("permitted_binds", format_rules(config.permitted_binds())),
    ];
    for (name, value) in rows {
        println!("  {:<24} {:<32} ({})", name, value, config.source(name));
    }
}

fn format_rules(rules: &[String]) -> String {
    if rules.is_empty() {
        "<any>".to_string()
    } else {
        rules.join(", ")
    }
}

/// Bind each permitted bind rule once; wildcard hosts bind every interface and
/// wildcard ports an ephemeral port
async fn probe_binds(config: &ForwardConfig) -> Result<()> {
    if config.permitted_binds().is_empty() {
        warn!("No permitted_binds rules to probe");
        return Ok(());
    }

    let mut failures = 0;
    for rule in config.permitted_binds() {
        let rule: AddressRule = rule.parse()?;
        let host = rule.host().unwrap_or("");
        let port = u32::from(rule.port().unwrap_or(0));

        let outcome = match resolve_tcp_addr(host, port).await {
            Ok(addr) => TcpListener::bind(addr)
                .await
                .and_then(|listener| listener.local_addr())
                .map_err(Into::into),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(bound) => println!("  probe {:<30} ok ({})", rule, bound),
            Err(e) => {
                failures += 1;
                println!("  probe {:<30} FAILED: {}", rule, e);
            }
        }
    }

    if failures > 0 {
        warn!("{} permitted bind rule(s) could not be bound", failures);
    }
    Ok(())
}
