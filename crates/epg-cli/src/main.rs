//! `ziggogo-epg`: grab the ZiggoGo EPG for TVHeadend or into an XMLTV file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use epg::{GrabOutcome, Grabber, GrabberConfig, SyncMode};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod io;

use io::{ChannelListIo, FileIo, TvSystem, TvheadendIo};

/// Configurations compiled into the binary, by name.
const BUNDLED_CONFIGURATIONS: &[(&str, &str)] =
    &[("ziggo-nl", include_str!("../../../config/ziggo-nl.toml"))];

#[derive(Debug, Parser)]
#[command(name = "ziggogo-epg")]
#[command(version)]
#[command(about = "ZiggoGo EPG grabber")]
#[command(long_about = None)]
struct Cli {
    /// Configuration to use: a bundled name or a path to a TOML file
    #[arg(short = 's', long, default_value = "ziggo-nl", value_name = "CONFIGURATION")]
    configuration: String,

    /// Number of days to grab (overrides the configuration)
    #[arg(short = 'n', long, value_name = "DAYS")]
    scan_days: Option<u32>,

    /// Use file mode instead of TVHeadend mode
    #[arg(short = 'f', long)]
    file_mode: bool,

    /// Hostname of TVHeadend, used for getting the channel list
    #[arg(long, default_value = "localhost", value_name = "HOSTNAME", help_heading = "TVHeadend mode")]
    tvh_host: String,

    /// Port of TVHeadend, used for getting the channel list
    #[arg(long, default_value_t = 9981, value_name = "PORT_NR", help_heading = "TVHeadend mode")]
    tvh_port: u16,

    /// Username of TVHeadend
    #[arg(long, default_value = "", value_name = "USER", help_heading = "TVHeadend mode")]
    tvh_username: String,

    /// Password of TVHeadend
    #[arg(long, default_value = "", value_name = "PASS", help_heading = "TVHeadend mode")]
    tvh_password: String,

    /// Path to the XMLTV socket of TVHeadend
    #[arg(
        long,
        default_value = "/home/hts/.hts/tvheadend/epggrab/xmltv.sock",
        value_name = "SOCKET",
        help_heading = "TVHeadend mode"
    )]
    tvh_socket: PathBuf,

    /// File containing the channel list, one name per line
    #[arg(long, default_value = "channels.txt", value_name = "FILENAME", help_heading = "File mode")]
    channel_file: PathBuf,

    /// Name of a channel to grab, can be given multiple times
    #[arg(
        short = 'c',
        long = "channel",
        value_name = "CHANNEL",
        conflicts_with = "channel_file",
        help_heading = "File mode"
    )]
    channels: Vec<String>,

    /// Write all known channels to the channel file instead of grabbing
    #[arg(long, conflicts_with = "xmltv_file", help_heading = "File mode")]
    write_channel_list: bool,

    /// XMLTV output file
    #[arg(long, default_value = "ziggogo.xml", value_name = "FILENAME", help_heading = "File mode")]
    xmltv_file: PathBuf,

    /// Override the timezone used in the XMLTV file
    #[arg(long, value_name = "TZ", help_heading = "Tweaks")]
    timezone: Option<String>,

    /// Directory where the cache database is created
    #[arg(long, default_value = ".", value_name = "PATH", help_heading = "Tweaks")]
    database_location: PathBuf,

    /// Generate XMLTV from the existing cache without network access
    #[arg(long, help_heading = "Tweaks")]
    generate_only: bool,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_filter = ["epg", "epg_core", "epg_cache", "epg_ziggo", "ziggogo_epg"]
        .iter()
        .map(|target| format!("{}={}", target, cli.log_level))
        .collect::<Vec<_>>()
        .join(",");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ZiggoGo EPG v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => {
            info!("Done!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_configuration(&cli.configuration)?;
    if let Some(days) = cli.scan_days {
        config.sync.scan_days = days;
    }
    if let Some(timezone) = &cli.timezone {
        config.timezone.clone_from(timezone);
    }
    config.validate().context("Invalid settings")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current requests");
            on_signal.cancel();
        }
    });

    let grabber = Grabber::open(config, &cli.database_location)
        .with_context(|| {
            format!(
                "Failed to open the cache in '{}'",
                cli.database_location.display()
            )
        })?
        .with_cancellation(cancel);

    if cli.write_channel_list {
        let channels = grabber.channel_list().await?;
        io::write_channel_list(&cli.channel_file, &channels).await?;
        return Ok(());
    }

    let tv_system = tv_system(&cli)?;
    let names = tv_system.channel_names().await?;
    if names.is_empty() {
        bail!("The channel list is empty, nothing to grab");
    }

    let mode = if cli.generate_only {
        SyncMode::GenerateOnly
    } else {
        SyncMode::Incremental
    };
    let outcome = grabber.run(&names, mode).await?;
    report(&outcome);

    tv_system.write_xmltv(outcome.xmltv.as_bytes()).await?;
    Ok(())
}

fn tv_system(cli: &Cli) -> Result<Box<dyn TvSystem>> {
    if !cli.file_mode {
        let io = TvheadendIo::new(
            &cli.tvh_host,
            cli.tvh_port,
            cli.tvh_username.clone(),
            cli.tvh_password.clone(),
            cli.tvh_socket.clone(),
        )?;
        return Ok(Box::new(io));
    }

    if cli.channels.is_empty() {
        Ok(Box::new(FileIo::new(
            cli.channel_file.clone(),
            cli.xmltv_file.clone(),
        )))
    } else {
        Ok(Box::new(ChannelListIo::new(
            cli.channels.clone(),
            cli.xmltv_file.clone(),
        )))
    }
}

/// Resolves a configuration name or path and loads it.
fn load_configuration(name: &str) -> Result<GrabberConfig> {
    let path = Path::new(name);
    if path.is_file() {
        return GrabberConfig::load(path)
            .with_context(|| format!("Failed to load configuration '{}'", name));
    }

    let local = Path::new("config").join(format!("{}.toml", name));
    if local.is_file() {
        info!("Using configuration '{}'", local.display());
        return GrabberConfig::load(&local)
            .with_context(|| format!("Failed to load configuration '{}'", local.display()));
    }

    match BUNDLED_CONFIGURATIONS.iter().find(|(bundled, _)| *bundled == name) {
        Some((_, text)) => GrabberConfig::from_toml(text)
            .with_context(|| format!("Bundled configuration '{}' is invalid", name)),
        None => bail!(
            "Unknown configuration '{}'. Bundled configurations: {}",
            name,
            BUNDLED_CONFIGURATIONS
                .iter()
                .map(|(bundled, _)| *bundled)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn report(outcome: &GrabOutcome) {
    for name in outcome.unmatched() {
        warn!("Channel '{}' was not found at ZiggoGo and is skipped", name);
    }

    if let Some(summary) = &outcome.summary {
        for failure in &summary.failures {
            warn!("Failed to grab {}: {}", failure.target, failure.error);
        }
        info!("Sync: {}", summary);
    }
    info!("Wrote {} programmes", outcome.programmes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["ziggogo-epg"]).unwrap();
        assert_eq!(cli.configuration, "ziggo-nl");
        assert_eq!(cli.tvh_port, 9981);
        assert!(!cli.file_mode);
        assert!(cli.scan_days.is_none());
        assert_eq!(cli.xmltv_file, PathBuf::from("ziggogo.xml"));
    }

    #[test]
    fn test_cli_file_mode_with_channels() {
        let cli = Cli::try_parse_from([
            "ziggogo-epg",
            "-f",
            "-c",
            "NPO 1",
            "--channel",
            "RTL 4",
            "-n",
            "3",
            "--generate-only",
        ])
        .unwrap();
        assert!(cli.file_mode);
        assert!(cli.generate_only);
        assert_eq!(cli.channels, vec!["NPO 1", "RTL 4"]);
        assert_eq!(cli.scan_days, Some(3));
    }

    #[test]
    fn test_cli_rejects_conflicting_channel_sources() {
        let result = Cli::try_parse_from([
            "ziggogo-epg",
            "-f",
            "-c",
            "NPO 1",
            "--channel-file",
            "list.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bundled_configuration_loads() {
        let config = load_configuration("ziggo-nl").unwrap();
        assert_eq!(config.provider.name, "ZiggoGo");
        assert!(load_configuration("does-not-exist").is_err());
    }

    #[test]
    fn test_configuration_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "timezone = \"UTC\"\n[provider]\nchannel_list_url = \"http://x/c\"\nsegment_url = \"http://x/{segment}\"\ndetail_url = \"http://x/{program}\"\n",
        )
        .unwrap();

        let config = load_configuration(path.to_str().unwrap()).unwrap();
        assert_eq!(config.timezone, "UTC");
    }
}
