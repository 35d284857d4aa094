// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Common argument: transaction selector
fn transaction_arg(name: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .help("Transaction id, 'last' or 'last-N'")
}

fn flag(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .action(ArgAction::SetTrue)
        .help(help)
}

/// Tolerance flags shared by replay, undo, rollback and redo
fn replay_args(cmd: Command) -> Command {
    cmd.arg(flag("ignore_installed", "ignore-installed", "Accept entries that disagree with what is installed"))
        .arg(flag("ignore_extras", "ignore-extras", "Accept packages the resolver pulls in beyond the document"))
        .arg(flag("skip_unavailable", "skip-unavailable", "Skip packages, groups and environments that cannot be found"))
        .arg(flag("strict", "strict", "Fail when a requested package cannot be installed"))
        .arg(flag("no_strict", "no-strict", "Allow requested packages to be skipped"))
        .arg(flag("dry_run", "dry-run", "Show the resolved transaction without recording it"))
}

fn history_cli() -> Command {
    Command::new("history")
        .about("Transaction history")
        .subcommand(
            Command::new("list")
                .about("List recorded transactions, most recent first")
                .arg(Arg::new("limit").short('l').long("limit").help("Show at most this many transactions")),
        )
        .subcommand(
            Command::new("info")
                .about("Show one transaction, or a range merged into one")
                .arg(Arg::new("transactions").required(true).help("Transaction id or range A..B")),
        )
        .subcommand(
            Command::new("store")
                .about("Write a transaction or merged range to a replay file")
                .arg(Arg::new("transactions").required(true).help("Transaction id or range A..B"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value("transaction.json")
                        .help("Output file"),
                ),
        )
        .subcommand(replay_args(
            Command::new("replay")
                .about("Replay a stored transaction file")
                .arg(Arg::new("file").required(true).help("Replay file written by 'history store'")),
        ))
        .subcommand(replay_args(
            Command::new("undo")
                .about("Revert a single transaction")
                .arg(transaction_arg("transaction")),
        ))
        .subcommand(replay_args(
            Command::new("rollback")
                .about("Revert every transaction after the given one")
                .arg(transaction_arg("transaction")),
        ))
        .subcommand(replay_args(
            Command::new("redo")
                .about("Repeat a transaction")
                .arg(transaction_arg("transaction")),
        ))
}

fn build_cli() -> Command {
    Command::new("reprise")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Reprise Contributors")
        .about("Package transaction history with merge, undo, rollback and replay")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .default_value("/etc/reprise/reprise.toml")
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("db_path")
                .short('d')
                .long("db-path")
                .global(true)
                .value_name("PATH")
                .help("Database path (overrides db_path from the configuration)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Show debug output"),
        )
        .subcommand(Command::new("init").about("Initialize a new reprise database"))
        .subcommand(history_cli())
        .subcommand(
            Command::new("packages")
                .about("Package snapshot used to resolve replays")
                .subcommand(
                    Command::new("import")
                        .about("Load installed and available packages from a JSON file")
                        .arg(Arg::new("file").required(true)),
                )
                .subcommand(
                    Command::new("list")
                        .about("List the package snapshot, installed builds first")
                        .arg(flag("installed", "installed", "Only show installed builds")),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true)),
        )
}

fn render(cmd: Command, path: &Path) -> Result<(), String> {
    let mut buffer = Vec::new();
    Man::new(cmd)
        .render(&mut buffer)
        .map_err(|e| format!("Failed to render man page: {}", e))?;
    fs::write(path, buffer).map_err(|e| format!("Failed to write man page: {}", e))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let pages = [
        (build_cli(), "reprise.1"),
        (history_cli().name("reprise-history"), "reprise-history.1"),
    ];
    for (cmd, file) in pages {
        if let Err(e) = render(cmd, &man_dir.join(file)) {
            println!("cargo:warning={}", e);
        }
    }
}
