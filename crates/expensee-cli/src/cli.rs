//! Command-line arguments.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use expensee_core::models::TrendPeriod;

#[derive(Debug, Parser)]
#[command(name = "expensee", version, about = "Track expenses, budgets and receipts")]
pub struct Cli {
    /// Server base URL (overrides config and EXPENSEE_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Also write logs to a daily rolling file in the cache directory
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and store the session in the OS keyring
    Login {
        /// Email address; defaults to the last one used
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Revoke the session and forget stored credentials
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Create a new account
    Register {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Request a password reset email, or complete one with --token
    ResetPassword {
        email: String,
        #[arg(long)]
        token: Option<String>,
    },
    #[command(subcommand)]
    Expenses(ExpenseCommand),
    #[command(subcommand)]
    Categories(CategoryCommand),
    #[command(subcommand)]
    Budgets(BudgetCommand),
    #[command(subcommand)]
    Receipts(ReceiptCommand),
    /// Spending trends, category split and top merchants
    Analytics(AnalyticsArgs),
}

#[derive(Debug, Subcommand)]
pub enum ExpenseCommand {
    List {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    Show {
        id: String,
    },
    Add {
        merchant: String,
        /// Decimal amount, e.g. 12.50
        amount: String,
        /// Transaction date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Category name
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Receipt image to attach after creating the expense
        #[arg(long)]
        receipt: Option<PathBuf>,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "tag")]
        icon: String,
        #[arg(long, default_value = "#808080")]
        color: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum BudgetCommand {
    /// Budgets with spending for a month (defaults to the current month)
    List {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
    },
    Add {
        name: String,
        amount: String,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
        /// Category name; omit for an overall budget
        #[arg(long)]
        category: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ReceiptCommand {
    /// Upload a receipt image for OCR
    Scan {
        path: PathBuf,
        #[arg(long)]
        notes: Option<String>,
        /// Wait for OCR to finish and print the extracted fields
        #[arg(long)]
        wait: bool,
    },
    /// Check OCR progress
    Status {
        ocr_id: String,
    },
    /// Create an expense from OCR results
    Accept {
        ocr_id: String,
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct AnalyticsArgs {
    #[arg(long, value_enum, default_value_t = Period::Monthly)]
    pub period: Period,
    #[arg(long)]
    pub from: Option<NaiveDate>,
    #[arg(long)]
    pub to: Option<NaiveDate>,
    #[arg(long, default_value_t = 5)]
    pub top: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Period {
    Weekly,
    Monthly,
    Yearly,
}

impl From<Period> for TrendPeriod {
    fn from(period: Period) -> Self {
        match period {
            Period::Weekly => TrendPeriod::Weekly,
            Period::Monthly => TrendPeriod::Monthly,
            Period::Yearly => TrendPeriod::Yearly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_expense_add() {
        let cli = Cli::try_parse_from([
            "expensee", "expenses", "add", "Costco", "42.10", "--date", "2024-07-04", "--category",
            "Groceries",
        ])
        .unwrap();

        match cli.command {
            Command::Expenses(ExpenseCommand::Add {
                merchant,
                amount,
                date,
                category,
                ..
            }) => {
                assert_eq!(merchant, "Costco");
                assert_eq!(amount, "42.10");
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 7, 4));
                assert_eq!(category.as_deref(), Some("Groceries"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_api_url_after_subcommand() {
        let cli = Cli::try_parse_from(["expensee", "whoami", "--api-url", "https://x.test"]).unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("https://x.test"));
        assert!(matches!(cli.command, Command::Whoami));
    }

    #[test]
    fn test_analytics_defaults() {
        let cli = Cli::try_parse_from(["expensee", "analytics"]).unwrap();
        match cli.command {
            Command::Analytics(args) => {
                assert_eq!(args.period, Period::Monthly);
                assert_eq!(args.top, 5);
                assert_eq!(TrendPeriod::from(args.period), TrendPeriod::Monthly);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["expensee", "expenses", "list", "--from", "July"]).is_err());
    }
}
