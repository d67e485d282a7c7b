//! Command-line interface for futures-consensus
//!
//! # Usage
//!
//! ```bash
//! export DEEPSEEK_API_KEY=... GEMINI_API_KEY=... GROQ_API_KEY=...
//! export ALPHA_VANTAGE_API_KEY=...
//!
//! futures-consensus register --username trader --email trader@example.com --password 'correct horse'
//! futures-consensus analyze --user <user-id> NQ ES
//! futures-consensus usage --user <user-id>
//!
//! # Operator commands need FC_ADMIN_PASSWORD_HASH set from `hash-password`
//! futures-consensus admin --password '...' top-users --limit 5
//! ```

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use consensus_billing::{
    AccountService, AdminService, BillingConfig, CardDetails, Plan, PurchaseOutcome,
    SqliteEntitlementStore, gateway_for, hash_password,
};
use consensus_core::Symbol;
use consensus_market::{AnalysisPipeline, PipelineConfig};
use consensus_utils::{Config, init_tracing_with, load_dotenv};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "futures-consensus")]
#[command(about = "Consensus trading signals for equity index futures", long_about = None)]
struct Args {
    /// Fallback log filter when RUST_LOG is not set
    #[arg(long, default_value = "warn,consensus_market=info,consensus_billing=info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account with a free trial
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Check credentials and print the user id
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Change a user's password
    Passwd {
        #[arg(long)]
        user: String,
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Run one metered analysis per symbol
    Analyze {
        #[arg(long)]
        user: String,
        /// NQ, ES or YM
        #[arg(required = true)]
        symbols: Vec<Symbol>,
        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Buy a plan
    Subscribe {
        #[arg(long)]
        user: String,
        /// basic or premium
        #[arg(long)]
        plan: Plan,
        #[arg(long)]
        card_number: Option<String>,
        /// MM/YY
        #[arg(long)]
        expiry: Option<String>,
        #[arg(long)]
        cvc: Option<String>,
        #[arg(long)]
        cardholder: Option<String>,
    },
    /// Finish a hosted checkout
    Confirm {
        #[arg(long)]
        user: String,
        #[arg(long)]
        plan: Plan,
        #[arg(long)]
        session: String,
    },
    /// Show the active subscription and recent runs
    Usage {
        #[arg(long)]
        user: String,
    },
    /// Print a password hash for FC_ADMIN_PASSWORD_HASH
    HashPassword {
        #[arg(long)]
        password: String,
    },
    /// Operator commands
    Admin {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long)]
        password: String,
        #[command(subcommand)]
        command: AdminCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// Totals across users, plans and symbols
    Overview,
    Users,
    Subscriptions,
    /// Remove a user with their subscriptions and usage
    DeleteUser { user_id: String },
    DeactivateSubscription { subscription_id: String },
    /// Top up a subscription, re-activating it when the user has no other
    AddRuns {
        subscription_id: String,
        /// 1 to 100
        runs: u32,
    },
    /// Replace the user's active subscription with a fresh trial
    GrantTrial { user_id: String },
    /// Users with the most runs
    TopUsers {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Runs per day
    UsageByDay,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Some(path) = load_dotenv() {
        debug!("loaded environment from {}", path.display());
    }
    let app = Config::from_env()?;
    let args = Args::parse();
    init_tracing_with(app.log_format, &args.log);

    let billing = BillingConfig::from_env()?;
    let store = Arc::new(
        SqliteEntitlementStore::connect(&billing.database_url)
            .await
            .context("opening the entitlement database")?,
    );
    let accounts = Arc::new(AccountService::new(store.clone(), billing.clone()));

    match args.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let user = accounts.register(&username, &email, &password).await?;
            println!("Registered {} ({})", user.username, user.id);
            println!(
                "Trial: {} runs valid for {} days",
                billing.trial_runs, billing.trial_days
            );
        }
        Command::Login { username, password } => {
            let user = accounts.authenticate(&username, &password).await?;
            println!("{}", user.id);
        }
        Command::Passwd { user, current, new } => {
            accounts.change_password(&user, &current, &new).await?;
            println!("Password changed");
        }
        Command::Analyze {
            user,
            symbols,
            json,
        } => {
            let config = PipelineConfig::from_env()?;
            let pipeline = AnalysisPipeline::from_config(&config, accounts)?;
            for symbol in symbols {
                info!(%symbol, "starting run");
                let report = pipeline.run(&user, symbol).await?;
                let path = report.save(&config.data_dir)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("{}", report.render_table());
                    println!("Saved to {}", path.display());
                }
            }
        }
        Command::Subscribe {
            user,
            plan,
            card_number,
            expiry,
            cvc,
            cardholder,
        } => {
            let card = match (card_number, expiry, cvc) {
                (Some(number), Some(expiry), Some(cvc)) => Some(CardDetails {
                    number,
                    expiry,
                    cvc,
                    cardholder_name: cardholder.unwrap_or_default(),
                }),
                (None, None, None) => None,
                _ => bail!("--card-number, --expiry and --cvc must be given together"),
            };
            let gateway = gateway_for(billing.payment_mode)?;
            let outcome = accounts
                .purchase(&user, plan, gateway.as_ref(), card)
                .await?;
            print_purchase(&outcome);
        }
        Command::Confirm {
            user,
            plan,
            session,
        } => {
            let gateway = gateway_for(billing.payment_mode)?;
            let outcome = accounts
                .complete_checkout(&user, plan, gateway.as_ref(), &session)
                .await?;
            print_purchase(&outcome);
        }
        Command::Usage { user } => {
            let stats = accounts.usage_stats(&user).await?;
            match &stats.subscription {
                Some(sub) => println!(
                    "{} plan: {} of {} runs left{}",
                    sub.plan,
                    sub.runs_remaining,
                    sub.runs_allowed,
                    sub.expires_at
                        .map(|at| format!(", expires {}", at.format("%Y-%m-%d %H:%M UTC")))
                        .unwrap_or_default()
                ),
                None => println!("No active subscription"),
            }
            println!("Total runs: {}", stats.total_runs);
            let mut table = table(vec!["When", "Symbol", "Subscription"]);
            for record in &stats.recent {
                table.add_row(vec![
                    record.at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    record.symbol.clone(),
                    record.subscription_id.clone(),
                ]);
            }
            println!("{table}");
        }
        Command::HashPassword { password } => {
            println!("{}", hash_password(&password, billing.password_rounds)?);
        }
        Command::Admin {
            username,
            password,
            command,
        } => {
            let admin = AdminService::new(store, billing.clone());
            admin.authenticate(&username, &password)?;
            match command {
                AdminCommand::Overview => {
                    println!("{}", serde_json::to_string_pretty(&admin.overview().await?)?);
                }
                AdminCommand::Users => {
                    let mut table = table(vec!["Id", "Username", "Email", "Created", "Last login"]);
                    for user in admin.users().await? {
                        table.add_row(vec![
                            user.id,
                            user.username,
                            user.email,
                            user.created_at.format("%Y-%m-%d").to_string(),
                            user.last_login.map_or_else(
                                || "-".to_string(),
                                |at| at.format("%Y-%m-%d %H:%M").to_string(),
                            ),
                        ]);
                    }
                    println!("{table}");
                }
                AdminCommand::Subscriptions => {
                    let mut table = table(vec![
                        "Id", "User", "Plan", "Runs", "Expires", "Active", "Payment",
                    ]);
                    for sub in admin.subscriptions().await? {
                        table.add_row(vec![
                            sub.id,
                            sub.user_id,
                            sub.plan.to_string(),
                            format!("{}/{}", sub.runs_remaining, sub.runs_allowed),
                            sub.expires_at.map_or_else(
                                || "never".to_string(),
                                |at| at.format("%Y-%m-%d").to_string(),
                            ),
                            sub.active.to_string(),
                            sub.payment_id.unwrap_or_default(),
                        ]);
                    }
                    println!("{table}");
                }
                AdminCommand::DeleteUser { user_id } => {
                    if admin.delete_user(&user_id).await? {
                        println!("Deleted {user_id}");
                    } else {
                        bail!("no user {user_id}");
                    }
                }
                AdminCommand::DeactivateSubscription { subscription_id } => {
                    if admin.deactivate_subscription(&subscription_id).await? {
                        println!("Deactivated {subscription_id}");
                    } else {
                        println!("{subscription_id} was not active");
                    }
                }
                AdminCommand::AddRuns {
                    subscription_id,
                    runs,
                } => {
                    let sub = admin.add_runs(&subscription_id, runs).await?;
                    println!(
                        "{} now has {} of {} runs left ({})",
                        sub.id,
                        sub.runs_remaining,
                        sub.runs_allowed,
                        if sub.active { "active" } else { "inactive" }
                    );
                }
                AdminCommand::GrantTrial { user_id } => {
                    let granted = admin.grant_trial(&user_id).await?;
                    println!(
                        "Trial {} active with {} runs",
                        granted.current.id, granted.current.runs_remaining
                    );
                }
                AdminCommand::TopUsers { limit } => {
                    let mut table = table(vec!["Username", "Runs", "Id"]);
                    for user in admin.top_users(limit).await? {
                        table.add_row(vec![user.username, user.runs.to_string(), user.user_id]);
                    }
                    println!("{table}");
                }
                AdminCommand::UsageByDay => {
                    let mut table = table(vec!["Day", "Runs"]);
                    for (day, runs) in admin.usage_by_day().await? {
                        table.add_row(vec![day.to_string(), runs.to_string()]);
                    }
                    println!("{table}");
                }
            }
        }
    }

    Ok(())
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_purchase(outcome: &PurchaseOutcome) {
    match outcome {
        PurchaseOutcome::Activated(replacement) => {
            println!(
                "{} plan active with {} runs",
                replacement.current.plan, replacement.current.runs_remaining
            );
            if replacement.carried_over > 0 {
                println!("{} unused runs carried over", replacement.carried_over);
            }
        }
        PurchaseOutcome::Pending {
            session_id,
            checkout_url,
        } => {
            println!("Complete payment at {checkout_url}");
            println!("Then run: futures-consensus confirm --session {session_id} ...");
        }
        PurchaseOutcome::Declined { reason } => println!("Payment declined: {reason}"),
    }
}
