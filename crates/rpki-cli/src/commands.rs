use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use rpki_runs::{Paging, SearchTerm, Sorting, ValidationRun};
use rpki_storage::{Storage, StorageConfig};
use rpki_types::{CheckStatus, Key};
use serde::Serialize;

use crate::cli::*;

fn load_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => StorageConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.path = db.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    rpki_storage::log_config(&config);
    tracing::debug!(db = %config.path.display(), "opening storage");
    let storage = Storage::open(config).context("opening storage")?;
    let format = cli.format;
    match cli.command {
        Command::Stats => cmd_stats(&storage, format),
        Command::Verify => cmd_verify(&storage, format),
        Command::Gc(args) => cmd_gc(&storage, args, format),
        Command::PruneRuns(args) => cmd_prune(&storage, args, format),
        Command::Objects(args) => cmd_objects(&storage, args, format),
        Command::Show(args) => cmd_show(&storage, args, format),
        Command::TrustAnchors => cmd_trust_anchors(&storage, format),
        Command::Runs(args) => cmd_runs(&storage, args, format),
        Command::Checks(args) => cmd_checks(&storage, args, format),
        Command::Settings(args) => cmd_settings(&storage, args, format),
        Command::ClearRuns => cmd_clear_runs(&storage, format),
    }
}

fn cmd_stats(storage: &Storage, format: OutputFormat) -> anyhow::Result<()> {
    let stats = storage.stats()?;
    if format == OutputFormat::Json {
        return print_json(&stats);
    }
    println!("Objects: {}", stats.objects.to_string().bold());
    for (object_type, count) in &stats.objects_by_type {
        if *count > 0 {
            println!("  {:<12} {}", object_type.cyan(), count);
        }
    }
    println!("Trust anchors: {}", stats.trust_anchors.to_string().bold());
    println!("Validation runs:");
    for (kind, count) in &stats.runs_by_kind {
        println!("  {:<18} {}", kind.cyan(), count);
    }
    Ok(())
}

fn cmd_verify(storage: &Storage, format: OutputFormat) -> anyhow::Result<()> {
    let report = storage.verify()?;
    if format == OutputFormat::Json {
        print_json(&report)?;
    } else if report.is_consistent() {
        println!(
            "{} {} objects and {} locations verified",
            "✓".green().bold(),
            report.objects,
            report.locations
        );
    } else {
        for (label, problems) in [("dangling", &report.dangling), ("stale", &report.stale), ("unindexed", &report.unindexed)] {
            for problem in problems {
                println!("  {} {} {}", label.red(), problem.index.yellow(), problem.object);
            }
        }
    }
    if !report.is_consistent() {
        anyhow::bail!("{} index problems found", report.problem_count());
    }
    Ok(())
}

#[derive(Serialize)]
struct Removed {
    removed: u64,
}

fn cmd_gc(storage: &Storage, args: GcArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = storage.config().clone();
    if let Some(hours) = args.retention_hours {
        config.object_retention_hours = hours;
    }
    let batch_size = args.batch_size.unwrap_or(config.gc_batch_size);
    let threshold = config.object_threshold(Utc::now())?;
    let removed = storage
        .objects()
        .sweep_unreachable_objects(storage.env(), threshold, batch_size)?;
    if format == OutputFormat::Json {
        return print_json(&Removed { removed });
    }
    println!("{} GC: {} objects unreachable since {} removed.", "✓".green(), removed, threshold.to_rfc3339());
    Ok(())
}

fn cmd_prune(storage: &Storage, args: PruneArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = storage.config().clone();
    if let Some(days) = args.retention_days {
        config.run_retention_days = days;
    }
    let completed_before = config.run_threshold(Utc::now())?;
    let removed = storage.write(|tx| Ok(storage.runs().remove_old_validation_runs(tx, completed_before)?))?;
    if format == OutputFormat::Json {
        return print_json(&Removed { removed: removed as u64 });
    }
    println!("{} {} validation runs completed before {} removed.", "✓".green(), removed, completed_before.to_rfc3339());
    Ok(())
}

fn cmd_objects(storage: &Storage, args: ObjectsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let keys = storage.read(|tx| Ok(storage.objects().get_keys_by_type(tx, args.object_type)?))?;
    if format == OutputFormat::Json {
        let keys: Vec<String> = keys.iter().map(Key::to_hex).collect();
        return print_json(&keys);
    }
    for key in &keys {
        println!("{key}");
    }
    println!("{} {} objects", keys.len().to_string().bold(), args.object_type);
    Ok(())
}

#[derive(Serialize)]
struct ObjectView {
    key: String,
    object_type: String,
    size: usize,
    serial_number: Option<String>,
    signing_time: Option<String>,
    reachable_since: Option<String>,
    locations: Vec<String>,
}

fn cmd_show(storage: &Storage, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let key = Key::from_hex(&args.key).context("object key must be 64 hex characters")?;
    let found = storage.read(|tx| {
        let object = storage.objects().get(tx, &key)?;
        let locations = storage.objects().get_locations(tx, &key)?;
        Ok(object.map(|o| (o, locations)))
    })?;
    let Some((object, locations)) = found else {
        anyhow::bail!("object {key} not found");
    };

    let view = ObjectView {
        key: key.to_hex(),
        object_type: object.object_type.to_string(),
        size: object.encoded.len(),
        serial_number: object.serial_number.as_ref().map(ToString::to_string),
        signing_time: object.signing_time.map(|t| t.to_rfc3339()),
        reachable_since: object.reachable_since.map(|t| t.to_rfc3339()),
        locations: locations.into_iter().collect(),
    };
    if format == OutputFormat::Json {
        return print_json(&view);
    }
    println!("Object {} ({}, {} bytes)", view.key.yellow(), view.object_type.cyan(), view.size);
    if let Some(serial) = &view.serial_number {
        println!("  Serial: {serial}");
    }
    if let Some(at) = &view.signing_time {
        println!("  Signed: {at}");
    }
    match &view.reachable_since {
        Some(at) => println!("  Reachable since: {}", at.green()),
        None => println!("  Reachable since: {}", "never".red()),
    }
    for location in &view.locations {
        println!("  {}", location.blue());
    }
    Ok(())
}

fn cmd_trust_anchors(storage: &Storage, format: OutputFormat) -> anyhow::Result<()> {
    let anchors = storage.read(|tx| Ok(storage.runs().trust_anchors().find_all(tx)?))?;
    if format == OutputFormat::Json {
        return print_json(&anchors);
    }
    if anchors.is_empty() {
        println!("No trust anchors registered.");
    }
    for anchor in &anchors {
        println!("{} {}", format!("#{}", anchor.id).yellow(), anchor.name.bold());
        for location in &anchor.locations {
            println!("  {}", location.blue());
        }
    }
    Ok(())
}

fn print_run(run: &ValidationRun) {
    let status = match run.status {
        rpki_runs::RunStatus::Succeeded => run.status.to_string().green(),
        rpki_runs::RunStatus::Failed => run.status.to_string().red(),
        rpki_runs::RunStatus::Running => run.status.to_string().yellow(),
    };
    let completed = run
        .completed_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".into());
    let subject = match run.subject.repository() {
        Some(repository) => format!("ta #{} {}", run.subject.trust_anchor(), repository),
        None => format!("ta #{}", run.subject.trust_anchor()),
    };
    println!("{} {:<10} {} {}", format!("r#{}", run.id).yellow().bold(), status, completed.dimmed(), subject);
}

fn cmd_runs(storage: &Storage, args: RunsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let runs = storage.read(|tx| {
        let runs = if args.latest_successful {
            storage.runs().find_latest_successful(tx, args.kind)?
        } else {
            storage.runs().find_all(tx, args.kind)?
        };
        Ok(runs)
    })?;
    if format == OutputFormat::Json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        println!("No {} runs.", args.kind);
    }
    for run in &runs {
        print_run(run);
    }
    Ok(())
}

#[derive(Serialize)]
struct ChecksPage {
    run_id: u64,
    total: usize,
    checks: Vec<rpki_types::ValidationCheck>,
}

fn cmd_checks(storage: &Storage, args: ChecksArgs, format: OutputFormat) -> anyhow::Result<()> {
    let search = args.search.as_deref().map(SearchTerm::new);
    let paging = Paging::new(args.start, args.size);
    let sorting = Sorting::new(args.sort, args.direction);
    let page = storage.read(|tx| {
        let runs = storage.runs();
        if runs.find(tx, args.run_id)?.is_none() {
            return Ok(None);
        }
        let total = runs.count_validation_checks_for_run(tx, args.run_id, search.as_ref())?;
        let checks = runs.find_validation_checks_for_run(tx, args.run_id, paging, search.as_ref(), sorting)?;
        Ok(Some(ChecksPage {
            run_id: args.run_id,
            total,
            checks,
        }))
    })?;
    let Some(page) = page else {
        anyhow::bail!("validation run {} not found", args.run_id);
    };

    if format == OutputFormat::Json {
        return print_json(&page);
    }
    for check in &page.checks {
        let status = match check.status {
            CheckStatus::Passed => "passed".green(),
            CheckStatus::Warning => "warning".yellow(),
            CheckStatus::Error => "error".red(),
        };
        println!("{:>6} {:<8} {} {}", check.id, status, check.key.bold(), check.location);
        if !check.parameters.is_empty() {
            println!("       {}", check.parameters.join(", ").dimmed());
        }
    }
    println!("{} of {} checks", page.checks.len(), page.total);
    Ok(())
}

fn cmd_settings(storage: &Storage, args: SettingsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let settings = storage.settings();
    match args.action {
        Some(SettingsAction::Set { name, value }) => {
            storage.write(|tx| settings.set(tx, &name, &value))?;
            if format == OutputFormat::Json {
                return print_json(&(name, value));
            }
            println!("Set {} = {}", name.bold(), value);
        }
        Some(SettingsAction::Get { name }) => {
            let value = storage.read(|tx| settings.get(tx, &name))?;
            if format == OutputFormat::Json {
                return print_json(&value);
            }
            match value {
                Some(value) => println!("{} = {}", name.bold(), value),
                None => println!("{} = (not set)", name.bold()),
            }
        }
        None => {
            let all = storage.read(|tx| settings.all(tx))?;
            if format == OutputFormat::Json {
                return print_json(&all);
            }
            if all.is_empty() {
                println!("No settings stored.");
            }
            for (name, value) in &all {
                println!("{} = {}", name.bold(), value);
            }
        }
    }
    Ok(())
}

fn cmd_clear_runs(storage: &Storage, format: OutputFormat) -> anyhow::Result<()> {
    let removed = storage.write(|tx| Ok(storage.runs().clear(tx)?))?;
    if format == OutputFormat::Json {
        return print_json(&Removed { removed: removed as u64 });
    }
    println!("{} {} validation runs removed.", "✓".green(), removed);
    Ok(())
}
