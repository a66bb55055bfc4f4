use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::{Context, Result};
use skylog_core::Settings;
use skylog_services::{PollEvent, Session};
use skylog_weather::history;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Window shown by a bare `history` command
const DEFAULT_HISTORY_HOURS: u64 = 24;

const HELP: &str = "\
Commands:
  city <name>      poll <name> from now on (added to the saved list)
  cities           list saved cities
  current          latest reading for the selected city
  history [hours]  readings for the selected city (default 24h)
  predict          forecast tomorrow's temperature
  help             show this text
  quit             stop polling and exit";

#[derive(Debug, PartialEq)]
enum Command {
    City(String),
    Cities,
    Current,
    History(u64),
    Predict,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "city" if rest.is_empty() => Err("usage: city <name>".to_string()),
            "city" => Ok(Command::City(rest.to_string())),
            "cities" => Ok(Command::Cities),
            "current" => Ok(Command::Current),
            "history" if rest.is_empty() => Ok(Command::History(DEFAULT_HISTORY_HOURS)),
            "history" => rest
                .parse()
                .map(Command::History)
                .map_err(|_| format!("not a number of hours: {}", rest)),
            "predict" => Ok(Command::Predict),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command '{}', try 'help'", other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (settings, validation) = Settings::load_validated()?;
    skylog_core::init(&settings)?;
    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    let (session, mut events) = Session::start(&settings).context("Failed to start session")?;

    println!(
        "skylog - polling {} every {}s. Type 'help' for commands.",
        session.current_city(),
        settings.poll_interval_secs
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match Command::parse(line) {
                    Ok(command) => {
                        if run_command(&session, command).await.is_break() {
                            break;
                        }
                    }
                    Err(message) => println!("{}", message),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    session.shutdown().await?;
    Ok(())
}

fn print_event(event: &PollEvent) {
    match event {
        PollEvent::NewReading(reading) => println!("\n{}\n", history::describe(reading)),
        PollEvent::FetchFailed { city, reason } => {
            println!("No data for {}: {}", city, reason);
        }
    }
}

async fn run_command(session: &Session, command: Command) -> ControlFlow<()> {
    match command {
        Command::City(name) => match session.select_city(&name).await {
            Ok(Some(reading)) => println!("{}", history::describe(&reading)),
            Ok(None) => println!("Now polling {}", session.current_city()),
            Err(e) => report(&e),
        },
        Command::Cities => {
            let current = session.current_city();
            for city in session.cities() {
                let marker = if city == current { '*' } else { ' ' };
                println!("{} {}", marker, city);
            }
        }
        Command::Current => match session.current_conditions().await {
            Ok(Some(reading)) => println!("{}", history::describe(&reading)),
            Ok(None) => println!("No readings yet for {}", session.current_city()),
            Err(e) => report(&e),
        },
        Command::History(hours) => {
            let window = Duration::from_secs(hours.saturating_mul(3600));
            match session.history(window).await {
                Ok(readings) if readings.is_empty() => {
                    println!("No readings for {} in the last {}h", session.current_city(), hours);
                }
                Ok(readings) => {
                    for reading in &readings {
                        println!(
                            "{}  {:>7.2} °F  {}",
                            reading.datetime.format("%Y-%m-%d %H:%M:%S"),
                            reading.temperature(),
                            reading.description().unwrap_or("")
                        );
                    }
                }
                Err(e) => report(&e),
            }
        }
        Command::Predict => println!("{}", session.predict_next_day().await),
        Command::Help => println!("{}", HELP),
        Command::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

fn report(error: &skylog_core::AppError) {
    tracing::error!("{}", error);
    println!("{}", error.user_message());
}
