//! wirecall CLI Client
//!
//! Command-line interface for calling wirecall services.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use wirecall::pipeline::{AuthTokenStage, Client, RawFormatter, TraceStage};
use wirecall::protocol::{HeaderName, Headers};
use wirecall::Config;

/// wirecall CLI
#[derive(Parser, Debug)]
#[command(name = "wirecall-cli")]
#[command(about = "CLI for calling wirecall services")]
#[command(version)]
struct Args {
    /// Attach this AuthToken header to every request
    #[arg(long)]
    auth_token: Option<String>,

    /// Read timeout in milliseconds (0 = wait forever)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call a service and print the response
    Call {
        /// Service url, e.g. tcp://127.0.0.1:8085/echo
        url: String,

        /// Request payload
        data: String,
    },

    /// Send a one-way request
    Send {
        /// Service url
        url: String,

        /// Request payload
        data: String,
    },

    /// Stream a file (or stdin) as a chunked request and print the response
    Stream {
        /// Service url
        url: String,

        /// File to send; stdin when omitted
        file: Option<PathBuf>,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> wirecall::Result<()> {
    let config = Config::builder().read_timeout_ms(args.timeout_ms).build();

    let mut client = Client::new(RawFormatter::new(), config)?.with_stage(TraceStage);
    if let Some(token) = args.auth_token {
        client = client.with_stage(AuthTokenStage::new(token));
    }

    let result = match args.command {
        Commands::Call { url, data } => client
            .call(&url, &data.into_bytes())
            .and_then(|response| print_response(&response)),
        Commands::Send { url, data } => client.call_one_way(&url, &data.into_bytes()),
        Commands::Stream { url, file } => {
            let headers = Headers::new().with(
                HeaderName::ContentType,
                RawFormatter::DEFAULT_CONTENT_TYPE,
            );
            client
                .call_streaming(&url, headers, |out| match file {
                    Some(path) => copy_all(&mut File::open(path)?, out),
                    None => copy_all(&mut io::stdin().lock(), out),
                })
                .and_then(|response| print_response(&response))
        }
    };

    client.shutdown();
    result
}

fn copy_all(input: &mut dyn Read, out: &mut dyn Write) -> io::Result<()> {
    io::copy(input, out)?;
    Ok(())
}

fn print_response(response: &[u8]) -> wirecall::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(response)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}
