//! SheetQL - ask analytical questions over uploaded spreadsheets.

use std::io::Write;
use std::process::ExitCode;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use sheetql::app::{App, InputResult};
use sheetql::cli::{render_answer, render_error, render_schema, Cli, Command, OutputFormat};
use sheetql::config::Config;
use sheetql::error::{Result, SheetqlError};
use sheetql::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if cli.is_interactive() {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            println!("{}", render_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load(Some(&config_path))?;
    cli.apply_overrides(&mut config)?;

    let app = App::from_config(&config)?;
    for source in &cli.load {
        app.load(source).await?;
    }

    match &cli.command {
        Command::Ask { question } => {
            let answer = app.ask(question).await?;
            println!("{}", render_answer(&answer, cli.format)?);
        }
        Command::Intent { json } => {
            let candidate: Value = serde_json::from_str(json)
                .map_err(|e| SheetqlError::validation("$", format!("not valid JSON: {e}")))?;
            let answer = app.run_intent(&candidate).await?;
            println!("{}", render_answer(&answer, cli.format)?);
        }
        Command::Schema => {
            println!("{}", render_schema(&app.schema(), cli.format)?);
        }
        Command::Repl => repl(&app, cli.format).await?,
    }

    Ok(())
}

/// Reads lines from stdin until EOF or `/quit`. Errors are printed and the
/// session continues.
async fn repl(app: &App, format: OutputFormat) -> Result<()> {
    println!("SheetQL v{}. Type /help for commands.", env!("CARGO_PKG_VERSION"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("sheetql> ");
        std::io::stdout()
            .flush()
            .map_err(|e| SheetqlError::internal(format!("Failed to flush stdout: {e}")))?;

        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| SheetqlError::internal(format!("Failed to read input: {e}")))?
        else {
            break;
        };

        match app.handle_input(&line).await {
            Ok(InputResult::None) => {}
            Ok(InputResult::Exit) => break,
            Ok(InputResult::Help(text)) => println!("{text}"),
            Ok(InputResult::Schema(snapshot)) => println!("{}", render_schema(&snapshot, format)?),
            Ok(InputResult::Loaded(schema)) => println!(
                "Loaded table '{}' ({} columns)",
                schema.name,
                schema.columns.len()
            ),
            Ok(InputResult::Answer(answer)) => println!("{}", render_answer(&answer, format)?),
            Err(e) => {
                error!("{}: {}", e.category(), e);
                println!("{}", render_error(&e));
            }
        }
    }

    Ok(())
}
