pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "edara",
    about = "Edara ticket approvals operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness, re-issue signed approval links and list overdue shift checkouts.",
    after_help = "Examples:\n  edara doctor --json\n  edara action-link --ticket-id TKT-1 --user-id fin-1 --order 1 --action approve\n  edara overdue-shifts --now 2026-03-01T18:30:00Z"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, signing key readiness, DB connectivity and schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Issue the signed approve/reject link for one approver")]
    ActionLink {
        #[arg(long)]
        ticket_id: String,
        #[arg(long)]
        user_id: String,
        #[arg(long, help = "Admin order the link is bound to")]
        order: u32,
        #[arg(long, help = "approve or reject")]
        action: String,
    },
    #[command(about = "List open shift attendances past their checkout time")]
    OverdueShifts {
        #[arg(long, help = "Evaluate at this RFC3339 instant instead of now")]
        now: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::ActionLink { ticket_id, user_id, order, action } => {
            commands::action_link::run(&ticket_id, &user_id, order, &action)
        }
        Command::OverdueShifts { now } => commands::overdue_shifts::run(now.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
