use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::process;

use meet_commit::{
    store, CommitOrchestrator, ConsoleProgress, NullProgress, PhaseSet, ProgressListener,
    RunError, RunOptions,
};

struct CliArgs {
    phases_dir: PathBuf,
    db_path: PathBuf,
    artifacts_dir: PathBuf,
    season_id: i64,
    season_description: String,
    quiet: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = env::args().skip(1);
    let Some(phases_dir) = args.next() else {
        return Err(anyhow!(
            "usage: meet-commit <phases-dir> [--db <path>] [--artifacts <dir>] \
             [--season <id>] [--season-description <text>] [--quiet]"
        ));
    };

    let mut cli = CliArgs {
        phases_dir: PathBuf::from(phases_dir),
        db_path: PathBuf::from("meet.db"),
        artifacts_dir: PathBuf::from("artifacts"),
        season_id: 0,
        season_description: String::new(),
        quiet: false,
    };

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--db" => {
                cli.db_path = args.next().map(PathBuf::from).ok_or_else(|| anyhow!("--db needs a path"))?;
            }
            "--artifacts" => {
                cli.artifacts_dir =
                    args.next().map(PathBuf::from).ok_or_else(|| anyhow!("--artifacts needs a directory"))?;
            }
            "--season" => {
                cli.season_id = args
                    .next()
                    .ok_or_else(|| anyhow!("--season needs an id"))?
                    .parse()
                    .map_err(|_| anyhow!("--season id must be an integer"))?;
            }
            "--season-description" => {
                cli.season_description =
                    args.next().ok_or_else(|| anyhow!("--season-description needs text"))?;
            }
            "--quiet" => cli.quiet = true,
            other => return Err(anyhow!("unknown flag: {}", other)),
        }
    }

    if cli.season_id == 0 {
        return Err(anyhow!("--season <id> is required"));
    }
    if cli.season_description.is_empty() {
        cli.season_description = format!("season {}", cli.season_id);
    }
    Ok(cli)
}

fn main() -> Result<()> {
    let cli = parse_args()?;

    println!("🏊 Meet Commit Pipeline v{}", meet_commit::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load the five phase payloads
    println!("\n📂 Loading phase payloads from {}...", cli.phases_dir.display());
    let phases = PhaseSet::load(&cli.phases_dir)?;
    for fingerprint in &phases.fingerprints {
        println!("  ✓ {}  {}", &fingerprint.sha256[..12], fingerprint.file_name);
    }

    // 2. Open the store
    println!("\n🔧 Opening database {}...", cli.db_path.display());
    let mut conn = store::open_database(&cli.db_path)?;
    store::setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Run the five phases in one transaction
    println!("\n💾 Committing five phases (season {})...", cli.season_id);
    let options = RunOptions {
        season_id: cli.season_id,
        season_description: cli.season_description.clone(),
        artifacts_dir: cli.artifacts_dir.clone(),
    };
    let mut console = ConsoleProgress;
    let mut silent = NullProgress;
    let listener: &mut dyn ProgressListener =
        if cli.quiet { &mut silent } else { &mut console };

    let mut orchestrator = CommitOrchestrator::new(&mut conn, options);
    match orchestrator.run(&phases, listener) {
        Ok(report) => {
            println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("🎉 Run {} COMMITTED", report.run_id);
            println!("✓ {} created / {} updated entities", report.stats.total_created(), report.stats.total_updated());
            for (entity, created, updated) in report.stats.iter() {
                println!("  {:<24} {:>4} / {}", entity, created, updated);
            }
            println!("✓ {} statements in audit script", report.statement_count);
            println!("✓ Audit script: {}", report.script_path.display());
            println!("✓ Run log:      {}", report.log_path.display());
            Ok(())
        }
        Err(RunError::RolledBack(failure)) => {
            eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            eprintln!("❌ Run {} ROLLED BACK ({} errors)", failure.run_id, failure.errors.len());
            for error in &failure.errors {
                for line in error.detail_lines() {
                    eprintln!("  {}", line);
                }
            }
            eprintln!("✓ Run log: {}", failure.log_path.display());
            process::exit(1);
        }
        Err(RunError::Infrastructure(err)) => Err(err),
    }
}
