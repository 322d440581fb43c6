//////////////////////////
// main.rs
//////////////////////////
//
// Console front end for the game service: create games, join them and play
// moves by hand. Pass a JSON config file as the only argument, or set the
// CHESS_* environment variables.

use std::io::{self, Write};

use anyhow::{Context, Result};
use colored::*;
use log::info;

use chess_sessions::{Color, GameService, MemoryStore, Position, SessionError, ServiceConfig};

type Service = GameService<MemoryStore>;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => ServiceConfig::from_env().context("reading CHESS_* environment")?,
    };
    info!("Starting with {:?}", config);
    let service = GameService::new(MemoryStore::new(), config)?;

    println!("{}", "Welcome to chess sessions!".bright_magenta());
    print_help();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();

        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["help"] => print_help(),
            ["play"] => play_local_game(&service).await,
            other => match run_command(&service, other).await {
                Ok(output) => println!("{}", output),
                Err(e) => report(&e),
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn print_help() {
    println!("\nCommands:");
    println!("  new                        - Start a game and print its seat tokens");
    println!("  join <game> <credential>   - Join a game as the credential's side");
    println!("  move <game> <credential> <move>  - Play a move such as e2e4 or e7e8q");
    println!("  fen <game>                 - Print the position");
    println!("  status <game>              - Print turn, check and result");
    println!("  board <game>               - Print the board");
    println!("  delete <game>              - Delete a game");
    println!("  play                       - Play both sides of a new game locally");
    println!("  quit                       - Exit");
}

async fn run_command(service: &Service, words: &[&str]) -> Result<String, SessionError> {
    let output = match words {
        ["new"] => {
            let created = service.start_game().await?;
            let mut text = format!("game {}", created.game_id);
            if let (Some(white), Some(black)) = (&created.white_token, &created.black_token) {
                text.push_str(&format!("\n  white token: {}\n  black token: {}", white, black));
            }
            text
        }
        ["join", game, credential] => {
            let joined = service.join(game, credential).await?;
            format!("joined as {}", joined.role)
        }
        ["move", game, credential, mv] => {
            let accepted = service.submit_move(game, credential, mv).await?;
            let mut text = format!("{}\nTurn: {}", accepted.new_fen, accepted.turn);
            if let Some(result) = accepted.result {
                text.push_str(&format!("\n{} {}", "Game over:".bright_red(), result));
            }
            text
        }
        ["fen", game] => service.position(game).await?.fen,
        ["status", game] => {
            let status = service.status(game).await?;
            format!(
                "turn: {}  check: {}  checkmate: {}  stalemate: {}  over: {}  result: {}",
                status.turn,
                status.is_check,
                status.is_checkmate,
                status.is_stalemate,
                status.is_game_over,
                status.result.as_deref().unwrap_or("*")
            )
        }
        ["board", game] => service.board(game).await?.rows.join("\n"),
        ["delete", game] => service.delete_game(game).await?.message,
        _ => format!("Unknown command: {} (try 'help')", words.join(" ")),
    };
    Ok(output)
}

fn report(error: &SessionError) {
    println!("{} [{}] {}", "❌".red(), error.kind(), error);
}

/// Both sides at one keyboard; the console holds both credentials.
async fn play_local_game(service: &Service) {
    let created = match service.start_game().await {
        Ok(created) => created,
        Err(e) => return report(&e),
    };
    let game = created.game_id;
    let credential = |turn: Color| -> String {
        let token = match turn {
            Color::White => &created.white_token,
            Color::Black => &created.black_token,
        };
        token.clone().unwrap_or_else(|| turn.to_string())
    };

    loop {
        let status = match service.status(&game).await {
            Ok(status) => status,
            Err(e) => return report(&e),
        };
        if let Ok(view) = service.position(&game).await {
            if let Ok(position) = Position::from_fen(&view.fen) {
                println!("{}", position);
            }
        }
        if let Some(result) = status.result {
            println!("{} {}", "Game over:".bright_red(), result);
            return;
        }
        if status.is_check {
            println!("{}", "Check!".yellow());
        }

        print!("{} to move (e.g. 'e2e4', or 'quit'): ", status.turn);
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let input = line.trim();
        if input == "quit" {
            return;
        }

        match service
            .submit_move(&game, &credential(status.turn), input)
            .await
        {
            Ok(_) => println!("{}", "Move successful!".green()),
            Err(e) => report(&e),
        }
    }
}
