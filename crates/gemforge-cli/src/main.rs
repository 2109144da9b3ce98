//! Gemforge CLI — run multi-agent gems from the command line.
//!
//! Reuses the workflow engine from gemforge-core; model calls go to the
//! Gemini API configured through `GEMINI_API_KEY` / `GEMINI_BASE_URL`.

use clap::{Parser, Subcommand};

use gemforge_cli::commands;

/// Gemforge CLI — Multi-agent workflow engine
#[derive(Parser)]
#[command(name = "gemforge", version, about = "Gemforge CLI — Multi-agent workflow engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a gem against a prompt
    Run {
        /// Built-in gem id (e.g. "flash", "gem-coder") or path to a gem YAML/JSON file
        gem: String,
        /// The initial prompt
        #[arg(long, short = 'p')]
        prompt: String,
        /// File sent alongside the prompt to agents that read {INITIAL_PROMPT}
        #[arg(long, short = 'a')]
        attach: Option<String>,
        /// Additional persona definitions directory
        #[arg(long, env = "GEMFORGE_PERSONA_DIR")]
        persona_dir: Option<String>,
        /// Print every artifact, not just the final answer
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Print the finished run as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a gem file without executing it
    Validate {
        /// Path to the gem YAML/JSON file
        file: String,
        /// Additional persona definitions directory
        #[arg(long, env = "GEMFORGE_PERSONA_DIR")]
        persona_dir: Option<String>,
    },
    /// List the built-in gems
    Gems,
    /// List available personas
    Personas {
        /// Additional persona definitions directory
        #[arg(long, env = "GEMFORGE_PERSONA_DIR")]
        persona_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemforge_core=warn,gemforge_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Run {
            gem,
            prompt,
            attach,
            persona_dir,
            verbose,
            json,
        }) => {
            commands::workflow::run(
                &gem,
                &prompt,
                attach.as_deref(),
                persona_dir.as_deref(),
                verbose,
                json,
            )
            .await
        }
        Some(Commands::Validate { file, persona_dir }) => {
            commands::workflow::validate(&file, persona_dir.as_deref())
        }
        Some(Commands::Gems) => commands::workflow::list_gems(),
        Some(Commands::Personas { persona_dir }) => {
            commands::workflow::list_personas(persona_dir.as_deref())
        }
        None => {
            // No subcommand — show help
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
