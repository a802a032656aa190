//! Subcommand handlers.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local};
use tracing::warn;

use expensee_core::api::client::{RECEIPT_POLL_INTERVAL, RECEIPT_POLL_MAX_ATTEMPTS};
use expensee_core::models::{
    BudgetRequest, CategoriesResponse, CategoryRequest, CreateExpense, DistributionParams,
    ExpenseDetail, ExpenseFilters, MerchantParams, OcrResult, ReceiptImage, RegisterRequest,
    SortOrder, TrendPeriod, TrendsParams,
};
use expensee_core::utils::truncate_string;
use expensee_core::{ApiClient, Config, SessionStore};

use crate::cli::{
    AnalyticsArgs, BudgetCommand, CategoryCommand, Command, ExpenseCommand, ReceiptCommand,
};

/// Merchant column width in expense listings
const MERCHANT_WIDTH: usize = 28;

pub async fn run(
    command: Command,
    client: &ApiClient,
    session: &SessionStore,
    config: &mut Config,
) -> Result<()> {
    match command {
        Command::Login { username } => login(client, config, username).await,
        Command::Logout => {
            client.logout().await;
            println!("Logged out.");
            Ok(())
        }
        Command::Register { email, name } => {
            let password = prompt_password("Choose a password: ")?;
            let request = RegisterRequest {
                email,
                password,
                full_name: name,
            };
            let user = client.register(&request).await?;
            println!("Account created for {}. Run `expensee login` to sign in.", user.email);
            Ok(())
        }
        Command::ResetPassword { email, token } => {
            let response = match token {
                Some(token) => {
                    let password = prompt_password("New password: ")?;
                    client.reset_password(&token, &password).await?
                }
                None => client.forgot_password(&email).await?,
            };
            println!("{}", response.message.as_deref().unwrap_or("Request sent."));
            Ok(())
        }
        Command::Whoami => {
            require_session(client, session).await?;
            whoami(client).await
        }
        Command::Expenses(cmd) => {
            require_session(client, session).await?;
            expenses(client, cmd).await
        }
        Command::Categories(cmd) => {
            require_session(client, session).await?;
            categories(client, cmd).await
        }
        Command::Budgets(cmd) => {
            require_session(client, session).await?;
            budgets(client, cmd).await
        }
        Command::Receipts(cmd) => {
            require_session(client, session).await?;
            receipts(client, cmd).await
        }
        Command::Analytics(args) => {
            require_session(client, session).await?;
            analytics(client, args).await
        }
    }
}

async fn require_session(client: &ApiClient, session: &SessionStore) -> Result<()> {
    if !client.restore_session().await? {
        bail!("Not logged in; run `expensee login` first");
    }
    if let Some(user) = session.snapshot().user {
        tracing::debug!(user = %user.email, "Resumed session");
    }
    Ok(())
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(client: &ApiClient, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt_line("Email: ")?,
    };
    let password = prompt_password("Password: ")?;

    let user = client.sign_in(&username, &password).await?;
    println!("Signed in as {}", user.display_name());

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

async fn whoami(client: &ApiClient) -> Result<()> {
    let user = client.current_user().await?;
    println!("{} <{}>", user.display_name(), user.email);
    if let Some(ref last) = user.last_login {
        println!("Last login: {}", last);
    }
    Ok(())
}

// ===== Expenses =====

async fn expenses(client: &ApiClient, cmd: ExpenseCommand) -> Result<()> {
    match cmd {
        ExpenseCommand::List {
            from,
            to,
            merchant,
            category,
            page,
            limit,
        } => {
            let filters = ExpenseFilters {
                from_date: from,
                to_date: to,
                merchant,
                category,
                page: Some(page),
                limit: Some(limit),
                sort_by: Some("transaction_date".to_string()),
                sort_order: Some(SortOrder::Desc),
                ..Default::default()
            };
            let list = client.list_expenses(&filters).await?;
            for expense in &list.expenses {
                println!(
                    "{}  {:<width$}  {:>10}  {}",
                    expense.transaction_date,
                    truncate_string(&expense.merchant_name, MERCHANT_WIDTH),
                    expense.total_amount,
                    expense.category_name().unwrap_or("-"),
                    width = MERCHANT_WIDTH,
                );
            }
            let p = &list.pagination;
            println!(
                "Page {}/{} ({} expenses){}",
                p.page,
                p.total_pages.max(1),
                p.total_count,
                if p.has_next() { ", more with --page" } else { "" }
            );
            if let Some(summary) = list.summary {
                println!("Total: {}  Average: {}", summary.total_expenses, summary.avg_expense);
            }
            Ok(())
        }
        ExpenseCommand::Show { id } => {
            print_expense(&client.expense(&id).await?);
            Ok(())
        }
        ExpenseCommand::Add {
            merchant,
            amount,
            date,
            category,
            notes,
            receipt,
        } => {
            let category_id = match category {
                Some(name) => Some(lookup_category(&client.categories().await?, &name)?),
                None => None,
            };
            let (category_id, user_category_id) = split_category(category_id);
            let request = CreateExpense {
                merchant_name: merchant,
                total_amount: amount,
                transaction_date: date.unwrap_or_else(|| Local::now().date_naive()),
                category_id,
                user_category_id,
                payment_method: None,
                location_name: None,
                notes,
                items: Vec::new(),
            };
            let mut created = client.create_expense(&request).await?;
            if let Some(path) = receipt {
                let image = ReceiptImage::from_path(&path)?;
                created = client
                    .attach_receipt(&created.expense.expense_id, &image)
                    .await?;
            }
            print_expense(&created);
            Ok(())
        }
        ExpenseCommand::Delete { id } => {
            client.delete_expense(&id).await?;
            println!("Deleted expense {}", id);
            Ok(())
        }
    }
}

fn print_expense(detail: &ExpenseDetail) {
    let e = &detail.expense;
    println!("{}  {}", e.expense_id, e.merchant_name);
    println!("  Amount:   {}", e.total_amount);
    println!("  Date:     {}", e.transaction_date);
    println!("  Category: {}", e.category_name().unwrap_or("-"));
    if let Some(ref notes) = e.notes {
        println!("  Notes:    {}", notes);
    }
    for item in &detail.items {
        println!("    {} x{}  {}", item.name, item.quantity, item.total_price);
    }
    if detail.receipt_image_url.is_some() || e.has_receipt_image {
        println!("  Receipt attached");
    }
}

/// Resolved category reference: default categories and user categories are
/// sent in different fields.
enum CategoryRef {
    Default(String),
    User(String),
}

fn lookup_category(categories: &CategoriesResponse, name: &str) -> Result<CategoryRef> {
    let category = categories
        .find_by_name(name)
        .with_context(|| format!("Unknown category '{}'", name))?;
    let id = category
        .id()
        .with_context(|| format!("Category '{}' has no id", name))?
        .to_string();
    Ok(if category.is_user_defined() {
        CategoryRef::User(id)
    } else {
        CategoryRef::Default(id)
    })
}

fn split_category(category: Option<CategoryRef>) -> (Option<String>, Option<String>) {
    match category {
        Some(CategoryRef::Default(id)) => (Some(id), None),
        Some(CategoryRef::User(id)) => (None, Some(id)),
        None => (None, None),
    }
}

// ===== Categories =====

async fn categories(client: &ApiClient, cmd: CategoryCommand) -> Result<()> {
    match cmd {
        CategoryCommand::List => {
            let all = client.categories().await?;
            for category in all.all() {
                println!(
                    "{:<36}  {}{}",
                    category.id().unwrap_or("-"),
                    category.name,
                    if category.is_user_defined() { "  (custom)" } else { "" }
                );
            }
            Ok(())
        }
        CategoryCommand::Add { name, icon, color } => {
            let created = client
                .create_category(&CategoryRequest { name, icon, color })
                .await?;
            println!("Created category {} ({})", created.name, created.id().unwrap_or("-"));
            Ok(())
        }
        CategoryCommand::Delete { id } => {
            client.delete_category(&id).await?;
            println!("Deleted category {}", id);
            Ok(())
        }
    }
}

// ===== Budgets =====

async fn budgets(client: &ApiClient, cmd: BudgetCommand) -> Result<()> {
    let today = Local::now().date_naive();
    match cmd {
        BudgetCommand::List { month, year } => {
            let month = month.unwrap_or_else(|| today.month());
            let year = year.unwrap_or_else(|| today.year());
            let response = client.budgets(Some(month), Some(year)).await?;
            if let Some(overall) = response.overall_budget {
                println!(
                    "Overall: {} of {} ({}%)",
                    overall.current_spending, overall.amount, overall.percentage_used
                );
            }
            for budget in &response.budgets {
                println!(
                    "{:<24}  {:>10} / {:<10}  {}%{}",
                    truncate_string(budget.display_name(), 24),
                    budget.current_spending,
                    budget.amount,
                    budget.percentage_used,
                    if budget.is_over_budget() { "  OVER" } else { "" }
                );
            }
            Ok(())
        }
        BudgetCommand::Add {
            name,
            amount,
            month,
            year,
            category,
        } => {
            let category_id = match category {
                Some(name) => Some(lookup_category(&client.categories().await?, &name)?),
                None => None,
            };
            let (category_id, user_category_id) = split_category(category_id);
            let request = BudgetRequest {
                amount,
                month: month.unwrap_or_else(|| today.month()),
                year: year.unwrap_or_else(|| today.year()),
                category_id,
                user_category_id,
                budget_name: name,
            };
            let budget = client.create_budget(&request).await?;
            println!("Created budget {} for {}/{}", budget.budget_id, budget.month, budget.year);
            Ok(())
        }
        BudgetCommand::Delete { id } => {
            client.delete_budget(&id).await?;
            println!("Deleted budget {}", id);
            Ok(())
        }
    }
}

// ===== Receipts =====

async fn receipts(client: &ApiClient, cmd: ReceiptCommand) -> Result<()> {
    match cmd {
        ReceiptCommand::Scan { path, notes, wait } => {
            let image = ReceiptImage::from_path(&path)?;
            let upload = client.upload_receipt(&image, notes.as_deref()).await?;
            println!("Uploaded receipt, OCR id {}", upload.ocr_id);
            if wait {
                let status = client
                    .wait_for_receipt(&upload.ocr_id, RECEIPT_POLL_INTERVAL, RECEIPT_POLL_MAX_ATTEMPTS)
                    .await?;
                println!("Status: {:?}", status.status);
                print_ocr(&client.ocr_results(&upload.ocr_id).await?);
            }
            Ok(())
        }
        ReceiptCommand::Status { ocr_id } => {
            let status = client.receipt_status(&ocr_id).await?;
            println!("{}: {:?}", ocr_id, status.status);
            Ok(())
        }
        ReceiptCommand::Accept { ocr_id, category } => {
            let ocr = client.ocr_results(&ocr_id).await?;
            let mut accepted = ocr.to_accept_request();
            if let Some(name) = category {
                let (category_id, user_category_id) =
                    split_category(Some(lookup_category(&client.categories().await?, &name)?));
                accepted.category_id = category_id;
                accepted.user_category_id = user_category_id;
            }
            let expense = client.accept_ocr_results(&ocr_id, &accepted).await?;
            print_expense(&expense);
            Ok(())
        }
    }
}

fn print_ocr(ocr: &OcrResult) {
    println!("  Merchant: {}", ocr.merchant_name.as_deref().unwrap_or("?"));
    println!("  Total:    {}", ocr.total_amount.as_deref().unwrap_or("?"));
    println!("  Date:     {}", ocr.transaction_date.as_deref().unwrap_or("?"));
    for item in &ocr.items {
        println!("    {} x{}  {}", item.name, item.quantity, item.total_price);
    }
}

// ===== Analytics =====

async fn analytics(client: &ApiClient, args: AnalyticsArgs) -> Result<()> {
    let trends = TrendsParams {
        period: Some(args.period.into()),
        start_date: args.from,
        end_date: args.to,
        category_id: None,
    };
    let distribution = DistributionParams {
        start_date: args.from,
        end_date: args.to,
    };
    let merchants = MerchantParams {
        start_date: args.from,
        end_date: args.to,
        limit: Some(args.top),
    };

    let (trends, distribution, merchants) = futures::try_join!(
        client.expense_trends(&trends),
        client.category_distribution(&distribution),
        client.merchant_analysis(&merchants),
    )?;

    println!("Spending by {}", TrendPeriod::from(args.period));
    for point in &trends.data_points {
        println!("  {:<12} {:>10}", point.date, point.total_amount);
    }

    println!(
        "By category (total {})",
        distribution.total_amount.as_deref().unwrap_or("-")
    );
    for share in &distribution.categories {
        println!("  {:<24} {:>10}  {}%", share.category.name, share.amount, share.percentage);
    }

    println!("Top merchants");
    for merchant in &merchants.top_merchants {
        println!(
            "  {:<24} {:>10}  {} visits",
            truncate_string(&merchant.merchant_name, 24),
            merchant.total_amount,
            merchant.transaction_count.unwrap_or(0)
        );
    }
    Ok(())
}
