use std::path::PathBuf;

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use leasewire::{Client, ClientConfig, DhcpOption, Interface, Result};

#[derive(Parser)]
#[command(name = "leasewire")]
#[command(author, version, about = "DHCPv4 client over raw link-layer sockets", long_about = None)]
struct Cli {
    /// Network interface to acquire a lease on.
    interface: String,

    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hostname to send with every request (defaults to the system's).
    #[arg(long)]
    hostname: Option<String>,

    /// Custom DHCP option as "code,value"; prefix the value with 0x for hex.
    #[arg(long = "option", value_name = "CODE,VALUE", value_parser = parse_option)]
    options: Vec<DhcpOption>,

    /// Extra option code to add to the parameter request list.
    #[arg(long = "request", value_name = "CODE")]
    request: Vec<u8>,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn parse_option(value: &str) -> std::result::Result<DhcpOption, String> {
    let (code, payload) = value
        .split_once(',')
        .ok_or_else(|| "invalid \"code,value\" pair".to_string())?;
    let code: u8 = code
        .parse()
        .map_err(|_| format!("option code {code:?} is invalid"))?;

    let data = match payload.strip_prefix("0x") {
        Some(hex) => decode_hex(hex).ok_or_else(|| format!("value {payload:?} is invalid hex"))?,
        None => payload.as_bytes().to_vec(),
    };

    Ok(DhcpOption::new(code, data))
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let digits = hex.as_bytes();
    if digits.is_empty() || !digits.len().is_multiple_of(2) {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let hi = char::from(pair[0]).to_digit(16)?;
            let lo = char::from(pair[1]).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

fn system_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|name| name.trim().to_string())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(hostname) = cli.hostname {
        config.hostname = hostname;
    }
    if config.hostname.is_empty() {
        config.hostname = system_hostname();
    }
    config.extra_options.extend(cli.options);
    config.extra_request_params.extend(cli.request);
    config.validate()?;

    let interface = Interface::by_name(&cli.interface)?;
    info!(
        interface = %interface.name,
        "starting dhcp client (hostname {:?})",
        config.hostname
    );

    let client = Client::new(interface, config);
    client.on_bound(|lease| {
        info!(
            "bound: {}/{} via {} (routers {:?}, dns {:?})",
            lease.fixed_address,
            lease.prefix_len(),
            lease.server_id,
            lease.routers,
            lease.dns_servers
        );
    });
    client.on_expire(|lease| info!("lease expired: {}", lease.fixed_address));
    client.start();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sigterm.recv() => break,
            _ = sighup.recv() => {
                info!("renewing lease");
                client.renew();
            }
            _ = sigusr1.recv() => {
                info!("acquiring a new lease");
                client.rebind();
            }
        }
    }

    client.stop().await;
    Ok(())
}
