// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .default_value("/var/lib/pkgledger/history.db")
        .help("Database path")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of text")
}

fn build_cli() -> Command {
    Command::new("pkgledger")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgledger Contributors")
        .about("Package transaction builder and install history")
        .subcommand_required(false)
        .subcommand(
            Command::new("init")
                .about("Initialize the history database")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the transaction a goal file turns into")
                .arg(Arg::new("goal").required(true).help("Path to the goal JSON file"))
                .arg(json_arg())
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("record")
                .about("Verify an executed goal against the installed packages and record it")
                .arg(Arg::new("goal").required(true).help("Path to the goal JSON file"))
                .arg(
                    Arg::new("installed")
                        .required(true)
                        .help("Path to a JSON list of the packages installed after execution"),
                )
                .arg(json_arg())
                .arg(
                    Arg::new("resume")
                        .long("resume")
                        .value_name("ID")
                        .help("Finish recording into this existing history transaction"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("Show transaction history, or the records of one transaction")
                .arg(Arg::new("transaction").help("Transaction ID"))
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("info")
                .about("Show what history knows about a package")
                .arg(
                    Arg::new("package")
                        .required(true)
                        .help("Package as name-[epoch:]version-release.arch"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("set-reason")
                .about("Raise the install reason of a package")
                .arg(Arg::new("package").required(true))
                .arg(
                    Arg::new("reason")
                        .required(true)
                        .help("One of user, group, dep, weak-dep, clean"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("set-repo")
                .about("Set the repository a package is recorded as coming from")
                .arg(Arg::new("package").required(true))
                .arg(Arg::new("repo").required(true))
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("user-installed")
                .about("List packages the user asked for that come from configured repositories")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("repo-add")
                .about("Register a repository")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("url").required(true))
                .arg(
                    Arg::new("priority")
                        .short('p')
                        .long("priority")
                        .default_value("0")
                        .help("Priority (higher wins)"),
                )
                .arg(
                    Arg::new("disabled")
                        .long("disabled")
                        .action(ArgAction::SetTrue)
                        .help("Register the repository disabled"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("repo-list")
                .about("List registered repositories")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("repo-remove")
                .about("Remove a registered repository")
                .arg(Arg::new("name").required(true))
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("bash, zsh, fish, elvish or powershell")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pkgledger.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
