use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use ticketrag::agent::AnswerEngine;
use ticketrag::config::AppConfig;
use ticketrag::database::Database;
use ticketrag::llm::LlmService;
use ticketrag::retrieval::RetrievalClient;
use ticketrag::Result;
use tracing::info;

#[derive(Parser)]
#[command(name = "ticketrag")]
#[command(about = "Customer support question answering over historical tickets")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay service (conversation persistence + client streaming)
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
        /// Enable permissive CORS
        #[arg(long)]
        cors: bool,
    },
    /// Start the agent service (retrieval + generation)
    ServeAgent {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
        /// Enable permissive CORS
        #[arg(long)]
        cors: bool,
    },
    /// Create the conversations and messages tables
    InitSchema,
    /// Ask one question without persistence (non-streaming)
    Ask {
        /// The question to answer
        question: String,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        ticketrag::logging::init_logging_with_level("debug")?;
    } else {
        ticketrag::logging::init_logging()?;
    }

    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");

    match cli.command {
        Commands::Serve { host, port, cors } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let cors = cors || config.server.enable_cors;
            ticketrag::api::serve_relay(&config, host, port, cors).await?;
        }
        Commands::ServeAgent { host, port, cors } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let cors = cors || config.server.enable_cors;
            ticketrag::api::serve_agent(&config, host, port, cors).await?;
        }
        Commands::InitSchema => {
            let db = Database::from_config(&config).await?;
            db.init_schema().await?;
            println!("Schema initialized");
        }
        Commands::Ask { question } => {
            handle_ask_command(&config, &question).await?;
        }
        Commands::Config => {
            handle_config_command(&config);
        }
    }

    Ok(())
}

async fn handle_ask_command(config: &AppConfig, question: &str) -> Result<()> {
    let retriever = Arc::new(RetrievalClient::new(config)?);
    let generator = Arc::new(LlmService::new(config)?);
    let engine = AnswerEngine::from_config(config, retriever, generator);

    match engine.ask(question).await {
        Ok(reply) => {
            println!("{}", reply.answer);
            println!();
            println!("Sources ({} retrieved):", reply.metadata.retrieved_docs);
            for source in &reply.sources {
                match source.score {
                    Some(score) => println!(
                        "  {} [{}] score {:.2}",
                        source.ticket_id, source.issue_type, score
                    ),
                    None => println!("  {} [{}]", source.ticket_id, source.issue_type),
                }
            }
            println!(
                "Answered in {:.2}s by {}",
                reply.metadata.query_time, reply.metadata.model
            );
        }
        Err(fault) => {
            eprintln!("Error: {fault}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn handle_config_command(config: &AppConfig) {
    println!("Server:        {}:{}", config.server.host, config.server.port);
    println!("Agent:         {}", config.agent_endpoint());
    println!("Vector index:  {}", config.vector_index.endpoint);
    println!("  collection:  {}", config.vector_index.collection);
    println!("  top_k:       {}", config.top_k());
    println!("Embeddings:    {} ({})", config.embeddings.model, config.embeddings.provider);
    println!("LLM model:     {}", config.llm.model);
    println!(
        "Timeouts:      exchange {}s, title {}s",
        config.exchange_timeout().as_secs(),
        config.title_timeout().as_secs()
    );
    println!("Log level:     {}", config.logging.level);
}
