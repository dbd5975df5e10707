use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whep_player::config::AppConfig;
use whep_player::whep::WhepClient;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// whep-player command line arguments
#[derive(Parser, Debug)]
#[command(name = "whep-player")]
#[command(version, about = "Play a WHEP stream through ffmpeg/ffplay", long_about = None)]
struct CliArgs {
    /// WHEP endpoint URL
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// JSON configuration file (command line options take precedence)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Preferred video codec (h264, h265)
    #[arg(long, value_name = "CODEC")]
    codec: Option<String>,

    /// Bearer token for the WHEP endpoint
    #[arg(long, value_name = "TOKEN", env = "WHEP_TOKEN")]
    token: Option<String>,

    /// STUN server URL (repeatable)
    #[arg(long, value_name = "URL")]
    stun: Vec<String>,

    /// Output frame size
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// ffmpeg binary
    #[arg(long, value_name = "PATH")]
    ffmpeg: Option<String>,

    /// ffplay binary
    #[arg(long, value_name = "PATH")]
    ffplay: Option<String>,

    /// Shell command receiving the raw elementary stream instead of ffmpeg/ffplay
    #[arg(long, value_name = "CMD")]
    sink_command: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECS")]
    http_timeout: Option<u64>,

    /// ICE gathering timeout in milliseconds
    #[arg(long, value_name = "MS")]
    gathering_timeout: Option<u64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose, args.log_json);

    let dump_config = args.dump_config;
    let config = build_config(args)?;

    if dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    tracing::info!("Starting whep-player v{}", env!("CARGO_PKG_VERSION"));

    let mut client = WhepClient::new(config)?;
    client.on_decoder_ready(|info, codec| {
        tracing::info!("Decoder ready for track {} ({})", info.id, codec);
    });

    if let Err(e) = client.connect().await {
        tracing::error!("Failed to connect: {}", e);
        if let Err(close_err) = client.shutdown().await {
            tracing::warn!("Cleanup after failed connect: {}", close_err);
        }
        return Err(e.into());
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!("Failed to listen for CTRL+C: {}", e);
            }
            tracing::info!("Shutdown signal received");
        }
        state = client.wait_for_disconnect() => {
            tracing::info!("Peer connection {}", state);
        }
    }

    let stats = client.shutdown().await?;
    for track in &stats {
        tracing::info!(
            "Track {}: {} packets, {} dropped, {} units, {} bytes",
            track.track_id,
            track.packets_received,
            track.packets_dropped,
            track.units_written,
            track.bytes_written
        );
    }

    Ok(())
}

/// Merge the optional config file with command line overrides
fn build_config(args: CliArgs) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            serde_json::from_str::<AppConfig>(&text)
                .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?
        }
        None => AppConfig::default(),
    };

    if let Some(url) = args.url {
        config.whep.endpoint_url = url;
    }
    if let Some(codec) = args.codec {
        config.whep.codec = codec;
    }
    if args.token.is_some() {
        config.whep.bearer_token = args.token;
    }
    if let Some(secs) = args.http_timeout {
        config.whep.http_timeout_secs = secs;
    }
    if let Some(ms) = args.gathering_timeout {
        config.whep.gathering_timeout_ms = ms;
    }
    if !args.stun.is_empty() {
        config.webrtc.stun_servers = args.stun;
    }
    if let Some((width, height)) = args.size {
        config.playback.width = width;
        config.playback.height = height;
    }
    if let Some(ffmpeg) = args.ffmpeg {
        config.playback.ffmpeg_path = ffmpeg;
    }
    if let Some(ffplay) = args.ffplay {
        config.playback.ffplay_path = ffplay;
    }
    if let Some(cmd) = args.sink_command {
        config.playback.sink_command = Some(vec!["sh".to_string(), "-c".to_string(), cmd]);
    }

    config.validate()?;
    Ok(config)
}

/// Parse `WxH`
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {}", s))?;
    let width = w.trim().parse().map_err(|_| format!("invalid width: {}", w))?;
    let height = h.trim().parse().map_err(|_| format!("invalid height: {}", h))?;
    Ok((width, height))
}

fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "whep_player=error,webrtc=error",
        LogLevel::Warn => "whep_player=warn,webrtc=warn",
        LogLevel::Info => "whep_player=info,webrtc=warn",
        LogLevel::Verbose => "whep_player=debug,webrtc=warn",
        LogLevel::Debug => "whep_player=debug,webrtc=info",
        LogLevel::Trace => "whep_player=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // stdout is left to --dump-config and sink commands
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
