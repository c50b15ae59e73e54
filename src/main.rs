// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use pkgledger::db::models::Repository;
use pkgledger::{
    Action, ConfiguredRepositories, History, PackageIdentity, Reason, SimpleGoal, Transaction,
    TransactionBuilder, TransactionVerifier,
};
use std::fs;
use tracing::info;

const DEFAULT_DB_PATH: &str = "/var/lib/pkgledger/history.db";

const PLAN_ORDER: [Action; 6] = [
    Action::Install,
    Action::Upgrade,
    Action::Downgrade,
    Action::Reinstall,
    Action::Erase,
    Action::Obsoleted,
];

#[derive(Parser)]
#[command(name = "pkgledger")]
#[command(author, version, about = "Package transaction builder and install history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the history database
    Init {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show the transaction a goal file turns into
    Plan {
        /// Path to the goal JSON file
        goal: String,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Verify an executed goal against the installed packages and record it
    Record {
        /// Path to the goal JSON file
        goal: String,
        /// Path to a JSON list of the packages installed after execution
        installed: String,
        /// Print the verification result as JSON
        #[arg(long)]
        json: bool,
        /// Finish recording into this existing history transaction
        #[arg(long, value_name = "ID")]
        resume: Option<i64>,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show transaction history, or the records of one transaction
    History {
        /// Transaction ID
        transaction: Option<i64>,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show what history knows about a package (name-[epoch:]version-release.arch)
    Info {
        package: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Raise the install reason of a package
    SetReason {
        package: String,
        /// One of user, group, dep, weak-dep, clean
        reason: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Set the repository a package is recorded as coming from
    SetRepo {
        package: String,
        repo: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// List packages the user asked for that come from configured repositories
    UserInstalled {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Register a repository
    RepoAdd {
        name: String,
        url: String,
        /// Priority (higher wins)
        #[arg(short, long, default_value_t = 0)]
        priority: i32,
        /// Register the repository disabled
        #[arg(long)]
        disabled: bool,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// List registered repositories
    RepoList {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Remove a registered repository
    RepoRemove {
        name: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Load a goal from a JSON file
fn read_goal(path: &str) -> Result<SimpleGoal> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read goal file {}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid goal file {}", path))
}

/// Load the installed package set from a JSON list
///
/// Entries are either identity objects or `name-[epoch:]version-release.arch` strings.
fn read_installed(path: &str) -> Result<Vec<PackageIdentity>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Nevra(String),
        Identity(PackageIdentity),
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read installed list {}", path))?;
    let entries: Vec<Entry> =
        serde_json::from_str(&content).with_context(|| format!("Invalid installed list {}", path))?;

    entries
        .into_iter()
        .map(|entry| -> Result<PackageIdentity> {
            match entry {
                Entry::Nevra(nevra) => Ok(PackageIdentity::parse_nevra(&nevra)?),
                Entry::Identity(pkg) => Ok(pkg),
            }
        })
        .collect()
}

fn print_plan(transaction: &Transaction) {
    if transaction.is_empty() {
        println!("Nothing to do.");
        return;
    }

    println!("Transaction plan:");
    for action in PLAN_ORDER {
        for item in transaction.items_of(action) {
            println!("  {}", item);
        }
    }
    println!(
        "\nTotal: {} ({} to install, {} to remove)",
        transaction.description(),
        transaction.install_set().len(),
        transaction.remove_set().len()
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing history database at: {}", db_path);
            pkgledger::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::Plan { goal, json, db_path }) => {
            let history = History::open(&db_path)?;
            let goal = read_goal(&goal)?;
            let transaction = TransactionBuilder::new(&history).build(&goal)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&transaction)?);
            } else {
                print_plan(&transaction);
            }
            Ok(())
        }
        Some(Commands::Record {
            goal,
            installed,
            json,
            resume,
            db_path,
        }) => {
            let mut history = History::open(&db_path)?;
            let goal = read_goal(&goal)?;
            let now_installed = read_installed(&installed)?;

            let mut transaction = TransactionBuilder::new(&history).build(&goal)?;
            if let Some(id) = resume {
                transaction.resume(id);
            }
            transaction.mark_executing();
            let result = TransactionVerifier::new(&mut history).verify(&mut transaction, &now_installed)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_plan(&transaction);
                println!("\nRecorded as transaction {}", result.transaction_id);
                for mismatch in result.mismatches() {
                    println!("  mismatch: {}", mismatch);
                }
            }

            if !result.is_success() {
                anyhow::bail!(
                    "Transaction {} does not match the system ({} mismatch(es))",
                    result.transaction_id,
                    result.mismatches().count()
                );
            }
            Ok(())
        }
        Some(Commands::History { transaction, db_path }) => {
            let history = History::open_existing(&db_path)?;

            if let Some(id) = transaction {
                let record = history.transaction(id)?;
                println!("Transaction {}: {} ({})", id, record.description, record.status.as_str());
                for entry in history.transaction_records(id)? {
                    let state = if entry.installed { "installed" } else { "removed" };
                    println!("  {} {} [{}] {}", state, entry.pkg, entry.reason, entry.ui_from_repo());
                }
                return Ok(());
            }

            let transactions = history.transactions()?;
            if transactions.is_empty() {
                println!("No transaction history.");
            } else {
                println!("Transaction history:");
                for record in &transactions {
                    let timestamp = record
                        .ended_at
                        .as_deref()
                        .or(record.begun_at.as_deref())
                        .unwrap_or("pending");
                    println!(
                        "  [{}] {} - {} ({})",
                        record.id.unwrap_or_default(),
                        timestamp,
                        record.description,
                        record.status.as_str()
                    );
                }
                println!("\nTotal: {} transaction(s)", transactions.len());
            }
            Ok(())
        }
        Some(Commands::Info { package, db_path }) => {
            let history = History::open_existing(&db_path)?;
            let pkg = PackageIdentity::parse_nevra(&package)?;
            let record = history.package(&pkg)?;

            println!("Package: {}", record.pkg);
            println!("  State: {}", if record.installed { "installed" } else { "removed" });
            println!("  Reason: {}", record.reason);
            println!("  From repo: {}", record.ui_from_repo());
            if let Some(checksum) = record.checksum() {
                println!("  Checksum: {}", checksum);
            }
            println!("  Transaction: {}", record.transaction_id);
            Ok(())
        }
        Some(Commands::SetReason {
            package,
            reason,
            db_path,
        }) => {
            let mut history = History::open_existing(&db_path)?;
            let pkg = PackageIdentity::parse_nevra(&package)?;
            let reason: Reason = reason.parse().map_err(|e: String| anyhow::anyhow!(e))?;

            history.set_reason(&pkg, reason)?;
            println!("Reason of {} is now {}", pkg, history.reason(&pkg)?);
            Ok(())
        }
        Some(Commands::SetRepo { package, repo, db_path }) => {
            let mut history = History::open_existing(&db_path)?;
            let pkg = PackageIdentity::parse_nevra(&package)?;

            history.set_repo(&pkg, &repo)?;
            println!("Repository of {} set to {}", pkg, repo);
            Ok(())
        }
        Some(Commands::UserInstalled { db_path }) => {
            let history = History::open_existing(&db_path)?;
            let repos = ConfiguredRepositories::load(history.connection())?;

            let packages = history.user_installed_packages(&repos)?;
            if packages.is_empty() {
                println!("No user-installed packages.");
            } else {
                for record in &packages {
                    println!("  {} {}", record.pkg, record.ui_from_repo());
                }
                println!("\nTotal: {} package(s)", packages.len());
            }
            Ok(())
        }
        Some(Commands::RepoAdd {
            name,
            url,
            priority,
            disabled,
            db_path,
        }) => {
            pkgledger::db::init(&db_path)?;
            let conn = pkgledger::db::open(&db_path)?;

            if Repository::find_by_name(&conn, &name)?.is_some() {
                anyhow::bail!("Repository '{}' already exists", name);
            }

            let mut repo = Repository::new(name.clone(), url);
            repo.priority = priority;
            repo.enabled = !disabled;
            repo.insert(&conn)?;

            println!("Added repository: {}", name);
            Ok(())
        }
        Some(Commands::RepoList { db_path }) => {
            let conn = pkgledger::db::open(&db_path)?;
            let repos = Repository::list_all(&conn)?;

            if repos.is_empty() {
                println!("No repositories configured.");
            } else {
                println!("Repositories:");
                for repo in &repos {
                    let status = if repo.enabled { "enabled" } else { "disabled" };
                    println!("  {} ({}, priority {}) {}", repo.name, status, repo.priority, repo.url);
                }
            }
            Ok(())
        }
        Some(Commands::RepoRemove { name, db_path }) => {
            let conn = pkgledger::db::open(&db_path)?;
            let repo = Repository::find_by_name(&conn, &name)?
                .ok_or_else(|| anyhow::anyhow!("Repository '{}' not found", name))?;
            let id = repo
                .id
                .ok_or_else(|| anyhow::anyhow!("Repository '{}' has no ID", name))?;

            Repository::delete(&conn, id)?;
            println!("Removed repository: {}", name);
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pkgledger", &mut std::io::stdout());
            Ok(())
        }
        None => {
            println!("pkgledger v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pkgledger --help' for usage information");
            Ok(())
        }
    }
}
