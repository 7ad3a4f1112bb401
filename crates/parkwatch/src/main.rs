use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use parkwatch::transport::{ServerConfig, serve};
use parkwatch::{ChannelConfig, Engine, EngineConfig, HttpChannel, VersionInfo};

struct Args {
    server: ServerConfig,
    slots: Option<u32>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: parkwatch [--host <host>] [--port <port>] [--slots <n>]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --host <host>    Address to bind [default: 0.0.0.0]");
            eprintln!("  --port <port>    Port to bind [default: 8080]");
            eprintln!("  --slots <n>      Number of parking slots, 1-8 [default: PARKWATCH_SLOTS or 3]");
            eprintln!();
            eprintln!("Remote channel settings come from PARKWATCH_CHANNEL_ID, PARKWATCH_WRITE_KEY,");
            eprintln!("PARKWATCH_READ_KEY and PARKWATCH_BASE_URL.");
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(args) {
        tracing::error!(error = %e, "parkwatch failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut server = ServerConfig::default();
    let mut slots = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                server.host = args.get(i).ok_or("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                let value = args.get(i).ok_or("--port requires a value")?;
                server.port = value
                    .parse()
                    .map_err(|_| format!("invalid port: {value}"))?;
            }
            "--slots" => {
                i += 1;
                let value = args.get(i).ok_or("--slots requires a value")?;
                slots = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid slot count: {value}"))?,
                );
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    Ok(Args { server, slots })
}

/// `RUST_LOG` wins; otherwise `PARKWATCH_LOG` picks the level for this crate.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("PARKWATCH_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("parkwatch={base_level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut engine_config = EngineConfig::from_env()?;
    if let Some(slots) = args.slots {
        engine_config = engine_config.with_slot_count(slots);
    }
    let channel_config = ChannelConfig::from_env()?;
    let version = VersionInfo::new().with_channel(channel_config.channel_id.clone());

    let channel = HttpChannel::new(channel_config).context("failed to build remote channel client")?;
    let engine = Engine::new(engine_config, Arc::new(channel))?.with_version(version);

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(async move {
        let engine = Arc::new(engine);
        engine.start();
        serve(args.server, engine).await
    })
}
