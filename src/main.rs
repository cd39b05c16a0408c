use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use segcli::{Res, cli, config, error, utils};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize with Spotify API
    Auth,

    /// Forget stored credentials
    Logout,

    /// Show authorization and device status
    Status,

    /// List available Spotify Connect devices
    Devices,

    /// Play a segment of a track
    Play(PlayArgs),

    /// Pause playback now
    Stop(StopArgs),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct PlayArgs {
    /// Track to play, e.g. spotify:track:4uLU6hMCjMI75M1A2tKUQC
    pub track_uri: String,

    /// Segment start (M:SS, H:MM:SS or seconds)
    #[clap(long, value_parser = utils::parse_time)]
    pub start: u64,

    /// Segment end (M:SS, H:MM:SS or seconds)
    #[clap(long, value_parser = utils::parse_time)]
    pub end: u64,

    /// Track length, rejects segments that run past it
    #[clap(long, value_parser = utils::parse_time)]
    pub duration: Option<u64>,

    /// Device name to play on (defaults to the active device)
    #[clap(long)]
    pub device: Option<String>,

    /// Replay the segment every time it ends
    #[clap(long = "loop")]
    pub looped: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StopArgs {
    /// Device name to pause (defaults to the active device)
    #[clap(long)]
    pub device: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn init_tracing() -> Res<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("Cannot initialize logging: {}", e);
    }

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Auth => cli::auth().await,
        Command::Logout => cli::logout().await,
        Command::Status => cli::status().await,
        Command::Devices => cli::list_devices().await,
        Command::Play(args) => {
            cli::play(cli::PlayOptions {
                track_uri: args.track_uri,
                start_ms: args.start,
                end_ms: args.end,
                track_duration_ms: args.duration,
                device: args.device,
                looped: args.looped,
            })
            .await
        }
        Command::Stop(args) => cli::stop(args.device).await,
        Command::Completions(opt) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
