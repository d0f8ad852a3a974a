use anyhow::Context;
use vantage_client::Role;

pub(crate) const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000/ws";
pub(crate) const DEFAULT_FRAMERATE: u32 = 30;

pub(crate) struct Args {
    pub server_url: String,
    pub room: String,
    pub role: Role,
    pub media: Option<String>,
    pub framerate: u32,
    pub grace_ms: u64,
    pub telemetry_interval_ms: u64,
    pub stun_urls: Vec<String>,
}

pub(crate) fn parse_args() -> anyhow::Result<Args> {
    let timing_defaults = vantage_protocol::SessionConfig::default();
    let mut server_url = DEFAULT_SERVER_URL.to_string();
    let mut room: Option<String> = None;
    let mut role: Option<Role> = None;
    let mut media: Option<String> = None;
    let mut framerate: u32 = DEFAULT_FRAMERATE;
    let mut grace_ms: u64 = timing_defaults.grace_period_ms;
    let mut telemetry_interval_ms: u64 = timing_defaults.telemetry_interval_ms;
    let mut stun_urls: Vec<String> = Vec::new();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("vantage-client {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                println!("vantage-client - Vantage peer session client");
                println!();
                println!("USAGE:");
                println!("    vantage-client --room <TOKEN> --role <publisher|viewer> [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    --server-url <URL>           Signaling relay WebSocket URL [default: {DEFAULT_SERVER_URL}]");
                println!("    --room <TOKEN>               Room token shared by both peers (required)");
                println!("    --role <ROLE>                publisher or viewer (required)");
                println!("    --media <PATH>               Annex-B H.264 file to publish (publisher only)");
                println!("    --framerate <FPS>            Publish frame rate [default: {DEFAULT_FRAMERATE}]");
                println!("    --grace-ms <MS>              Disconnect grace period [default: 4000]");
                println!("    --telemetry-interval-ms <MS> Telemetry ping cadence [default: 1000]");
                println!("    --stun <URL>                 STUN server URL (repeatable)");
                println!("    -V, --version                Print version and exit");
                println!("    -h, --help                   Print this help and exit");
                std::process::exit(0);
            }
            "--server-url" => {
                i += 1;
                server_url = args.get(i).context("Missing --server-url value")?.clone();
            }
            "--room" => {
                i += 1;
                room = Some(args.get(i).context("Missing --room value")?.clone());
            }
            "--role" => {
                i += 1;
                let value = args.get(i).context("Missing --role value")?;
                role = Some(match value.as_str() {
                    "publisher" => Role::Publisher,
                    "viewer" => Role::Viewer,
                    other => anyhow::bail!("Invalid role '{other}' (expected publisher or viewer)"),
                });
            }
            "--media" => {
                i += 1;
                media = Some(args.get(i).context("Missing --media value")?.clone());
            }
            "--framerate" => {
                i += 1;
                framerate = args
                    .get(i)
                    .context("Missing --framerate value")?
                    .parse()
                    .context("Invalid --framerate value")?;
            }
            "--grace-ms" => {
                i += 1;
                grace_ms = args
                    .get(i)
                    .context("Missing --grace-ms value")?
                    .parse()
                    .context("Invalid --grace-ms value")?;
            }
            "--telemetry-interval-ms" => {
                i += 1;
                telemetry_interval_ms = args
                    .get(i)
                    .context("Missing --telemetry-interval-ms value")?
                    .parse()
                    .context("Invalid --telemetry-interval-ms value")?;
            }
            "--stun" => {
                i += 1;
                stun_urls.push(args.get(i).context("Missing --stun value")?.clone());
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    Ok(Args {
        server_url,
        room: room.context("--room is required")?,
        role: role.context("--role is required")?,
        media,
        framerate,
        grace_ms,
        telemetry_interval_ms,
        stun_urls,
    })
}
