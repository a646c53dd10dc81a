mod hosted;
mod shell;
mod smoke;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "muse", version, about = "Gemini chat with text-to-image generation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat shell.
    Chat(ChatArgs),
    /// Manual smoke sequence against the live services.
    Smoke,
    /// One hosted text-to-image request saved to a file.
    Hosted(HostedArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct HostedArgs {
    #[arg(
        long,
        default_value = "A majestic lion standing on a savannah at sunset, photorealistic"
    )]
    prompt: String,
    #[arg(long, default_value = "stabilityai/stable-diffusion-2")]
    model: String,
    #[arg(long, default_value = "lion_sunset.png")]
    out: PathBuf,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("muse error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            shell::run_chat(args.events)?;
            Ok(0)
        }
        Command::Smoke => {
            smoke::run_smoke()?;
            Ok(0)
        }
        Command::Hosted(args) => hosted::run_hosted(&args.prompt, &args.model, &args.out),
    }
}
