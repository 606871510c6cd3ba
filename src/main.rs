//! docquery entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Connect, build providers, load or build the schema index
//!   7. Run the subcommand or the interactive prompt

use docquery::agent::QueryAgent;
use docquery::cli::{self, Command};
use docquery::{config, error, logger, repl};
use tracing::info;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = cli::parse_args(std::env::args().skip(1)).map_err(error::AppError::Config)?;
    if args.command == Command::Help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        app = %config.app_name,
        work_dir = %config.work_dir.display(),
        database = %config.database.name,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let mut agent = QueryAgent::start(config).await?;

    match args.command {
        Command::Ask(question) => println!("{}", agent.ask(&question).await.text),
        Command::Schema => println!("{}", agent.schema_summary()),
        Command::Reindex => {
            let n = agent.reindex().await?;
            println!("✓ Reindexed {n} collection{}", if n == 1 { "" } else { "s" });
        }
        Command::Repl => repl::run(&agent).await?,
        Command::Help => {}
    }
    Ok(())
}
