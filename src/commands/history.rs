// src/commands/history.rs
//! Transaction history commands: list, info, store, replay, undo, rollback, redo

use super::Settings;
use crate::cli::ReplayArgs;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use reprise::db::{PackageSnapshot, SqliteHistory, record_replay};
use reprise::history::{
    HistoryStore, MergedTransaction, PackageAction, TransactionRange, TransactionRecord,
    TransactionSelector, TransactionView,
};
use reprise::replay::{
    PlanningBuilder, ReplayContext, ReplayDocument, ReplayOptions, StagedComps,
    TransactionBuilder, TransactionItem, TransactionReplay, revert_document,
};
use reprise::{Config, SystemLock};
use std::path::Path;
use tracing::{info, warn};

fn format_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "(unfinished)".to_string())
}

fn login_user() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
}

fn command_line() -> String {
    std::env::args().skip(1).collect::<Vec<_>>().join(" ")
}

/// Records covered by `spec`, most recent first
fn select(history: &SqliteHistory, spec: &str) -> Result<Vec<TransactionRecord>> {
    let range: TransactionRange = spec.parse()?;
    let (first, last) = range.resolve(history)?;
    let records = history.range(first, last)?;
    if records.is_empty() {
        anyhow::bail!("No transaction found for '{}'", spec);
    }
    Ok(records)
}

fn find_one(history: &SqliteHistory, spec: &str) -> Result<TransactionRecord> {
    let selector: TransactionSelector = spec.parse()?;
    let id = selector.resolve(history)?;
    history
        .find_by_id(id)?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", id))
}

/// List recorded transactions
pub fn cmd_history_list(settings: &Settings, limit: Option<usize>) -> Result<()> {
    let (_, history) = settings.open_db()?;
    let records = history.list(limit)?;

    if records.is_empty() {
        println!("No transactions recorded.");
        return Ok(());
    }

    println!(
        "{:>6}  {:30}  {:19}  {:24}  {:>7}",
        "ID", "COMMAND LINE", "DATE AND TIME", "ACTION(S)", "ALTERED"
    );
    println!("{}", "-".repeat(96));

    for record in &records {
        let actions = record.actions()?;
        let mut kinds: Vec<&str> = Vec::new();
        for action in actions {
            if !kinds.contains(&action.action.as_str()) {
                kinds.push(action.action.as_str());
            }
        }
        let command = record.command_line.as_deref().unwrap_or("");
        let command: String = command.chars().take(30).collect();
        let marker = if record.altered_before_rpmdb || record.altered_after_rpmdb {
            "*"
        } else {
            " "
        };

        println!(
            "{:>6}  {:30}  {:19}  {:24}  {:>6}{}",
            record.id.unwrap_or_default(),
            command,
            format_time(Some(record.begin_timestamp)),
            kinds.join(", "),
            actions.len(),
            marker
        );
    }

    println!();
    println!("* = package database altered outside of reprise");
    Ok(())
}

fn print_actions(view: &dyn TransactionView) -> Result<()> {
    let actions = view.actions()?;
    println!("\nPackages Altered ({}):", actions.len());
    for action in actions {
        print_action(action);
    }

    let groups = view.group_actions()?;
    if !groups.is_empty() {
        println!("\nGroups Altered ({}):", groups.len());
        for group in groups {
            println!("  {:14} {}", group.action.as_str(), group.group.id);
        }
    }

    let environments = view.environment_actions()?;
    if !environments.is_empty() {
        println!("\nEnvironments Altered ({}):", environments.len());
        for environment in environments {
            println!("  {:14} {}", environment.action.as_str(), environment.environment.id);
        }
    }
    Ok(())
}

fn print_action(action: &PackageAction) {
    let marker = if action.done { "  " } else { "**" };
    let repo = action.repo_id.as_deref().unwrap_or("");
    println!(
        "{}{:14} {:45} {:12} {}",
        marker,
        action.action.as_str(),
        action.nevra.to_string(),
        repo,
        action.reason
    );
}

fn print_lines(title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for line in lines {
        println!("  {}", line);
    }
}

fn print_record(record: &TransactionRecord) -> Result<()> {
    println!("Transaction ID : {}", record.id.unwrap_or_default());
    println!("Begin time     : {}", format_time(Some(record.begin_timestamp)));
    println!("Begin rpmdb    : {}", record.begin_db_version);
    println!("End time       : {}", format_time(record.end_timestamp));
    println!(
        "End rpmdb      : {}",
        record.end_db_version.as_deref().unwrap_or("(unfinished)")
    );
    println!("User           : {}", record.login_user.as_deref().unwrap_or("(unknown)"));
    match record.return_code {
        Some(0) => println!("Return-Code    : Success"),
        Some(code) => println!("Return-Code    : Failure: {}", code),
        None => println!("Return-Code    : (unfinished)"),
    }
    if let Some(releasever) = &record.releasever {
        println!("Releasever     : {}", releasever);
    }
    println!("Command Line   : {}", record.command_line.as_deref().unwrap_or(""));
    for (name, value) in &record.extra {
        println!("{:15}: {}", name, value);
    }
    if record.altered_before_rpmdb {
        println!("\nThe package database was altered before this transaction.");
    }
    if record.altered_after_rpmdb {
        println!("The package database was altered after this transaction.");
    }

    print_actions(record)?;
    print_lines("Output", record.output()?);
    print_lines("Errors", record.errors()?);
    Ok(())
}

fn print_merged(merged: &MergedTransaction) -> Result<()> {
    let ids = merged.ids();
    let (first, last) = match (ids.first(), ids.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => (0, 0),
    };
    println!("Transaction IDs: {}..{}", first, last);
    println!("Begin time     : {}", format_time(Some(merged.begin_timestamp)));
    println!("Begin rpmdb    : {}", merged.begin_db_version);
    println!("End time       : {}", format_time(merged.end_timestamp));
    println!(
        "End rpmdb      : {}",
        merged.end_db_version.as_deref().unwrap_or("(unfinished)")
    );
    println!("Users          : {}", merged.login_users().join(", "));
    let codes: Vec<String> = merged
        .return_codes()
        .into_iter()
        .map(|code| code.map_or_else(|| "-".to_string(), |c| c.to_string()))
        .collect();
    println!("Return-Codes   : {}", codes.join(", "));
    for command in merged.command_lines() {
        println!("Command Line   : {}", command);
    }
    if merged.altered_before_rpmdb || merged.altered_after_rpmdb {
        println!("\nThe package database was altered outside of this range.");
    }

    print_actions(merged)?;
    print_lines("Merge warnings", merged.warnings());
    print_lines("Output", &merged.output()?);
    print_lines("Errors", &merged.errors()?);
    Ok(())
}

/// Show one transaction, or a range merged into one
pub fn cmd_history_info(settings: &Settings, spec: &str) -> Result<()> {
    let (_, history) = settings.open_db()?;
    let mut records = select(&history, spec)?;

    if records.len() == 1
        && let Some(record) = records.pop()
    {
        return print_record(&record);
    }
    let merged = MergedTransaction::new(records)?;
    print_merged(&merged)
}

/// Write a transaction or merged range to a replay file
pub fn cmd_history_store(settings: &Settings, spec: &str, output: &Path) -> Result<()> {
    let (_, history) = settings.open_db()?;
    let mut records = select(&history, spec)?;

    let document = if records.len() == 1
        && let Some(record) = records.pop()
    {
        ReplayDocument::from_view(&record)?
    } else {
        let merged = MergedTransaction::new(records)?;
        for warning in merged.warnings() {
            warn!("{}", warning);
        }
        ReplayDocument::from_view(&merged)?
    };

    document
        .write_to(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Transaction saved to {}", output.display());
    Ok(())
}

/// Replay a stored transaction file
pub fn cmd_history_replay(settings: &Settings, file: &Path, args: &ReplayArgs) -> Result<()> {
    let document = ReplayDocument::read_from(file)
        .with_context(|| format!("Failed to load replay file {}", file.display()))?;
    execute(settings, document, file.display().to_string(), args)
}

/// Revert a single transaction
pub fn cmd_history_undo(settings: &Settings, spec: &str, args: &ReplayArgs) -> Result<()> {
    let (_, history) = settings.open_db()?;
    let record = find_one(&history, spec)?;
    let id = record.id.unwrap_or_default();
    info!("Undoing transaction {}", id);

    let document = revert_document(&ReplayDocument::from_view(&record)?, &history, id)?;
    execute(settings, document, format!("undo of transaction {}", id), args)
}

/// Revert every transaction after the given one
pub fn cmd_history_rollback(settings: &Settings, spec: &str, args: &ReplayArgs) -> Result<()> {
    let (_, history) = settings.open_db()?;
    let target = find_one(&history, spec)?;
    let id = target.id.unwrap_or_default();
    let last = history.last()?.and_then(|r| r.id).unwrap_or(id);

    if last <= id {
        println!("Transaction {} is the most recent one, nothing to roll back.", id);
        return Ok(());
    }
    info!("Rolling back transactions {}..{}", id + 1, last);

    let merged = MergedTransaction::new(history.range(id + 1, last)?)?;
    for warning in merged.warnings() {
        warn!("{}", warning);
    }
    let document = revert_document(&ReplayDocument::from_view(&merged)?, &history, id + 1)?;
    execute(settings, document, format!("rollback to transaction {}", id), args)
}

/// Repeat a transaction
pub fn cmd_history_redo(settings: &Settings, spec: &str, args: &ReplayArgs) -> Result<()> {
    let (_, history) = settings.open_db()?;
    let record = find_one(&history, spec)?;
    let id = record.id.unwrap_or_default();
    info!("Redoing transaction {}", id);

    let document = ReplayDocument::from_view(&record)?;
    execute(settings, document, format!("redo of transaction {}", id), args)
}

fn replay_options(config: &Config, args: &ReplayArgs) -> ReplayOptions {
    let defaults = config.replay_options();
    ReplayOptions {
        ignore_extras: args.ignore_extras || defaults.ignore_extras,
        ignore_installed: args.ignore_installed || defaults.ignore_installed,
        skip_unavailable: args.skip_unavailable || defaults.skip_unavailable,
        strict: args.strict_or(defaults.strict),
    }
}

/// Replay `document` under the history lock
fn execute(
    settings: &Settings,
    document: ReplayDocument,
    source_name: String,
    args: &ReplayArgs,
) -> Result<()> {
    let lock_path = Config::lock_path_for(Path::new(&settings.db_path));
    let mut lock = SystemLock::with_retries(
        lock_path,
        settings.config.lock.retries,
        settings.config.lock_backoff(),
    );
    let token = lock
        .acquire()
        .context("Another reprise process is modifying the history")?;

    let result = plan_and_record(settings, document, source_name, args);
    lock.release(token)?;
    result
}

fn print_plan(items: &[TransactionItem]) {
    if items.is_empty() {
        println!("Nothing to do.");
        return;
    }
    println!("Transaction plan:");
    for item in items {
        println!(
            "  {:14} {:45} {:12} {}",
            item.action.as_str(),
            item.package.nevra.to_string(),
            item.package.repo_id,
            item.reason
        );
    }
}

fn plan_and_record(
    settings: &Settings,
    document: ReplayDocument,
    source_name: String,
    args: &ReplayArgs,
) -> Result<()> {
    let (conn, history) = settings.open_db()?;
    let snapshot = PackageSnapshot::new(conn, settings.config.installonly.clone());
    let mut builder = PlanningBuilder::new(&snapshot);
    let mut comps = StagedComps::new(history.clone());
    let mut replay = TransactionReplay::new(source_name, document, replay_options(&settings.config, args));

    {
        let mut ctx = ReplayContext::new(&snapshot, &mut builder, &mut comps);
        replay.run(&mut ctx)?;
    }
    let mut items = builder.resolve()?;
    replay.post_transaction(&mut items)?;

    for warning in replay.warnings() {
        eprintln!("Warning: {}", warning);
    }
    print_plan(&items);

    if args.dry_run {
        println!("\nDry run, nothing recorded.");
        return Ok(());
    }
    if items.is_empty() && comps.is_empty() {
        return Ok(());
    }

    let mut record = TransactionRecord::begin(snapshot.rpmdb_version()?, command_line());
    record.login_user = login_user();
    for item in &items {
        record.add_action(
            PackageAction::new(item.action, item.package.nevra.clone(), item.reason)
                .with_repo(item.package.repo_id.clone()),
        )?;
    }
    for group in &replay.document().groups {
        if comps.has_group_change(&group.group.id) {
            record.add_group_action(group.clone())?;
        }
    }
    for environment in &replay.document().environments {
        if comps.has_environment_change(&environment.environment.id) {
            record.add_environment_action(environment.clone())?;
        }
    }
    for warning in replay.warnings() {
        record.add_error(warning.clone())?;
    }

    let id = record_replay(&snapshot, &history, comps, &items, record)
        .context("Failed to record the replayed transaction")?;

    println!("\nRecorded transaction {}", id);
    Ok(())
}
