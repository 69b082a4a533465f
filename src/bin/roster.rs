use clap::{Parser, Subcommand};
use mealplan_portal::login::{CredentialVerifier, HashedRoster};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Maintain the hashed users file of the submission portal", long_about = None)]
struct Cli {
    /// Users file (same as PORTAL_USERS_FILE)
    #[arg(short, long, env = "PORTAL_USERS_FILE", default_value = "users.json")]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a user or replace their password
    Add { username: String, password: String },

    /// Check a username/password pair
    Check { username: String, password: String },

    /// List usernames
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut roster = match HashedRoster::load(&cli.file) {
        Ok(roster) => roster,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", cli.file.display());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Add { username, password } => {
            if let Err(e) = roster
                .set_password(&username, &password)
                .and_then(|_| roster.save(&cli.file))
            {
                eprintln!("Failed to add {username}: {e}");
                return ExitCode::FAILURE;
            }
            println!("Saved {username} to {}", cli.file.display());
        }
        Commands::Check { username, password } => {
            if !roster.verify(&username, &password) {
                println!("Rejected");
                return ExitCode::FAILURE;
            }
            println!("OK");
        }
        Commands::List => {
            for name in roster.usernames() {
                println!("{name}");
            }
        }
    }

    ExitCode::SUCCESS
}
