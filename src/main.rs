use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{error, info};

use reviewbot::chat;
use reviewbot::constants::DEFAULT_PORT;
use reviewbot::openai::ChatClient;
use reviewbot::prompt::{BookMetadata, FeedbackPreference};
use reviewbot::session::ReviewSession;
use reviewbot::web_server::{self, ServerConfig};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the review feedback web server.
    Start {
        #[arg(long, env = "REVIEWBOT_HOST", default_value = "127.0.0.1", help = "Address to bind the web server to.")]
        host: IpAddr,
        #[arg(long, env = "REVIEWBOT_PORT", default_value_t = DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding the page templates.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory holding the page script and stylesheet.")]
        static_dir: PathBuf,
    },
    /// Get feedback on a review from the terminal.
    Chat {
        #[arg(long, default_value = "comprehensive", help = "Feedback type to start with.")]
        preference: FeedbackPreference,
        #[arg(long, help = "Title of the reviewed book.")]
        title: Option<String>,
        #[arg(long, help = "Author of the reviewed book.")]
        author: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (server address, API base URL)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,reviewbot=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("reviewbot starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Start {
            host,
            port,
            templates,
            static_dir,
        } => {
            let config = ServerConfig {
                host,
                port,
                templates_dir: templates,
                static_dir,
            };
            let server = web_server::start_web_server(config, ChatClient::new());
            tokio::pin!(server);

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down...");
                }
                res = &mut server => {
                    if let Err(e) = res {
                        error!("Web server failed: {:?}", e);
                        return Err(e);
                    }
                }
            }
            info!("Shutdown complete.");
        }
        Commands::Chat {
            preference,
            title,
            author,
        } => {
            let mut session = ReviewSession::new();
            session.set_preference(preference);
            session.set_book(BookMetadata::new(
                title.unwrap_or_default(),
                author.unwrap_or_default(),
            ));

            chat::run_chat(
                &ChatClient::new(),
                &mut session,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await
            .context("Chat session failed")?;
        }
    }

    Ok(())
}
