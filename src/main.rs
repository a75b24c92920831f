use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use open_proxy::proxy::report::{render_outcome, render_summary};
use open_proxy::{BatchRunner, CheckerConfig, ListFormat, ProxyParser, ResultAccumulator};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

/// A concurrent proxy liveness checker
#[derive(Parser)]
#[command(name = "open-proxy")]
#[command(about = "A concurrent proxy liveness checker for HTTP, HTTPS, SOCKS4 and SOCKS5 proxies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging and per-proxy output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a proxy list and print the endpoints it contains
    Parse {
        /// Input file containing proxies
        input: PathBuf,
        /// Input format (txt or json); guessed from the extension when omitted
        #[arg(short, long)]
        format: Option<String>,
        /// Protocol for lines that do not name one
        #[arg(short = 't', long, default_value = "")]
        proxy_type: String,
    },
    /// Check proxies and save the ones that are alive
    Check {
        /// Input file containing proxies
        input: PathBuf,
        /// Input format (txt or json); guessed from the extension when omitted
        #[arg(short, long)]
        format: Option<String>,
        /// Output file for alive proxies (.json or text)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Protocol for lines that do not name one
        #[arg(short = 't', long, default_value = "")]
        proxy_type: String,
        /// Number of concurrent checks
        #[arg(short = 'n', long, default_value = "10")]
        workers: usize,
        /// Timeout in seconds for each check
        #[arg(long, default_value = "9")]
        timeout: u64,
        /// URL to test proxies against
        #[arg(long, default_value = "https://www.google.com")]
        target: String,
        /// Characters of response body and error text to show
        #[arg(long, default_value = "125")]
        excerpt_len: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    match cli.command {
        Commands::Parse {
            input,
            format,
            proxy_type,
        } => {
            let format = resolve_format(format.as_deref(), &input)?;
            let endpoints = ProxyParser::parse_file(&input, format, &proxy_type)?;
            for endpoint in &endpoints {
                println!("{}", endpoint);
            }
            println!("\nTotal: {} proxies", endpoints.len());
        }
        Commands::Check {
            input,
            format,
            output,
            proxy_type,
            workers,
            timeout,
            target,
            excerpt_len,
        } => {
            // Configuration errors are fatal before anything is probed.
            let config = CheckerConfig::new()
                .with_worker_count(workers)
                .with_timeout(Duration::from_secs(timeout))
                .with_reference_target(target)
                .with_excerpt_len(excerpt_len);
            let mut runner = BatchRunner::new(config)?;

            let format = resolve_format(format.as_deref(), &input)?;
            let endpoints = ProxyParser::parse_file(&input, format, &proxy_type)?;
            info!("Loaded {} proxies from {:?}", endpoints.len(), input);

            let total = endpoints.len();
            let printer = if cli.verbose {
                let (tx, mut rx) = mpsc::unbounded_channel();
                runner = runner.with_reporter(tx);
                Some(tokio::spawn(async move {
                    while let Some((index, outcome)) = rx.recv().await {
                        println!("{}\n", render_outcome(index, total, &outcome, excerpt_len));
                    }
                }))
            } else {
                None
            };

            let cancel = CancellationToken::new();
            let cancel_ctrlc = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, waiting for in-flight checks");
                    cancel_ctrlc.cancel();
                }
            });

            let accumulator = ResultAccumulator::new();
            let summary = runner.run_into(endpoints, cancel, accumulator.clone()).await;

            // Closing the reporter lets the printer drain and exit.
            drop(runner);
            if let Some(printer) = printer {
                printer.await?;
            }

            let verified = accumulator.sorted_by_index();
            println!("{}", render_summary(&summary));
            if !verified.is_empty() {
                println!("\nWorking proxies:");
                for proxy in &verified {
                    println!(
                        "  {} {} ({}ms, HTTP {})",
                        proxy.endpoint().to_simple_string(),
                        proxy.protocol,
                        proxy.elapsed.as_millis(),
                        proxy.status_code
                    );
                }
            }

            if let Some(output_path) = output {
                let out_format = ListFormat::from_path(&output_path);
                ProxyParser::save_to_file(&verified, &output_path, out_format)?;
                println!("Saved {} proxies to {:?}", verified.len(), output_path);
            }
        }
    }

    Ok(())
}

fn resolve_format(explicit: Option<&str>, path: &Path) -> Result<ListFormat> {
    match explicit {
        Some(s) => ListFormat::parse(s)
            .ok_or_else(|| anyhow!("Invalid list format: {}. Use: txt, json", s)),
        None => Ok(ListFormat::from_path(path)),
    }
}
