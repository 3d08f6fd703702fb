use droidmut::chain::MutatorFactory;
use droidmut::config::{DeviceConfig, ENV_CLASSFILES_PATH};
use droidmut::coverage::{CoverageStore, LocationIndex};
use droidmut::device::CancelFlag;
use droidmut::mutants::{MutantResult, MutantStatus};
use droidmut::output;
use droidmut::runner::{self, RunOptions};
use droidmut::safety;
use droidmut::state;
use droidmut::{discovery, mutators};

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "droidmut", version, about = "Mutation testing for Android instrumented tests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mutate the compiled classes and run the instrumented tests against every mutant
    Run {
        #[command(flatten)]
        device: DeviceConfig,
        /// Directory of compiled test classes
        #[arg(long)]
        test_classes: PathBuf,
        /// Mutators to apply (comma separated, default: all but null_mutate)
        #[arg(long, value_delimiter = ',')]
        mutators: Vec<String>,
        /// Only mutate classes whose internal name starts with this prefix
        #[arg(long)]
        class: Option<String>,
        /// Command that rebuilds and redeploys the application
        #[arg(long, default_value = runner::DEFAULT_PACKAGE_CMD)]
        package_cmd: String,
        /// Do not repackage after installing a mutant
        #[arg(long)]
        no_package: bool,
        /// Timeout for a single test run in milliseconds
        #[arg(long, default_value = "120000")]
        timeout_ms: u64,
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
        /// Exit code only, no output
        #[arg(short, long)]
        quiet: bool,
        /// Session ID written to the lock file (default: auto-generated)
        #[arg(long)]
        session: Option<String>,
    },
    /// List mutation sites without running anything
    List {
        /// Directory of compiled class artifacts
        #[arg(long, env = ENV_CLASSFILES_PATH)]
        classes: PathBuf,
        #[arg(long, value_delimiter = ',')]
        mutators: Vec<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show details for a survived mutant by ref
    Show {
        /// Mutant ref (e.g. @m1 or m1)
        #[arg(name = "ref")]
        mutant_ref: String,
        #[arg(long)]
        json: bool,
    },
    /// Summary of last run
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            device,
            test_classes,
            mutators,
            class,
            package_cmd,
            no_package,
            timeout_ms,
            json,
            quiet,
            session,
        } => {
            let options = RunOptions {
                package_cmd: (!no_package).then_some(package_cmd),
                project_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                timeout: Duration::from_millis(timeout_ms),
                cancel: CancelFlag::new(),
            };
            install_cancel_handler(&options.cancel);
            cmd_run(&device, &test_classes, &mutators, class.as_deref(), &options, json, quiet, session)
        }
        Commands::List { classes, mutators, class, json } => {
            cmd_list(&classes, &mutators, class.as_deref(), json)
        }
        Commands::Show { mutant_ref, json } => cmd_show(mutant_ref, json),
        Commands::Status { json } => cmd_status(json),
    };

    process::exit(exit_code);
}

/// Ctrl-C and SIGTERM only raise the flag; the run then restores the
/// original classes, redeploys and releases its lock before exiting.
fn install_cancel_handler(cancel: &CancelFlag) {
    let cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, restoring original classes...");
        cancel.cancel();
    }) {
        log::warn!("Could not install interrupt handler: {}", e);
    }
}

fn generate_session_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

fn select_mutators(requested: &[String]) -> Result<Vec<Box<dyn MutatorFactory>>, i32> {
    if requested.is_empty() {
        return Ok(mutators::defaults());
    }
    mutators::by_names(requested).map_err(|unknown| {
        output::print_error(&format!(
            "Unknown mutator '{}'. Available: {}",
            unknown,
            mutators::names().join(", ")
        ));
        2
    })
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => output::print_error(&format!("Failed to serialize output: {}", e)),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    device: &DeviceConfig,
    test_classes: &Path,
    requested: &[String],
    class_filter: Option<&str>,
    options: &RunOptions,
    json_mode: bool,
    quiet: bool,
    session: Option<String>,
) -> i32 {
    let classes_dir = &device.classes_dir;

    let factories = match select_mutators(requested) {
        Ok(f) => f,
        Err(code) => return code,
    };

    if !classes_dir.is_dir() {
        output::print_error(&format!(
            "Class directory not found: {}. Set {} or pass --classes.",
            classes_dir.display(),
            ENV_CLASSFILES_PATH
        ));
        return 2;
    }
    if !test_classes.is_dir() {
        output::print_error(&format!(
            "Test class directory not found: {}. Pass --test-classes <dir>.",
            test_classes.display()
        ));
        return 2;
    }

    let session_id = session.unwrap_or_else(generate_session_id);
    let _lock = match safety::DirLock::acquire(classes_dir, &session_id) {
        Ok(lock) => lock,
        Err(e) => {
            output::print_error(&e.to_string());
            return 3;
        }
    };

    // Backups are only leftovers once no live session holds the directory.
    let leftovers = safety::check_interrupted_run(classes_dir);
    if !leftovers.is_empty() {
        for (artifact, backup) in &leftovers {
            if let Err(e) = safety::restore_from_backup(artifact, backup) {
                output::print_error(&format!("Failed to restore {}: {}", artifact.display(), e));
            }
        }
        output::print_error(&format!(
            "Recovered {} class file(s) from a previously interrupted run. Re-run to continue.",
            leftovers.len()
        ));
        return 3;
    }

    let targets = match runner::find_targets(classes_dir, &factories, class_filter) {
        Ok(t) => t,
        Err(e) => {
            output::print_error(&format!("Failed to read classes: {}", e));
            return 3;
        }
    };
    if targets.is_empty() {
        if !quiet {
            if json_mode {
                print_json(&summarize(&[]));
            } else {
                output::print_success("No mutation sites found.");
            }
        }
        return 0;
    }

    let tests = match discovery::find_test_units(test_classes, &device.instrumented_test_paths) {
        Ok(t) => t,
        Err(e) => {
            output::print_error(&format!("Failed to read test classes: {}", e));
            return 3;
        }
    };
    if tests.is_empty() {
        output::print_error(&format!(
            "No instrumented tests found in {}.",
            test_classes.display()
        ));
        return 2;
    }

    let index = match LocationIndex::build(classes_dir) {
        Ok(i) => i,
        Err(e) => {
            output::print_error(&format!("Failed to index classes: {}", e));
            return 3;
        }
    };
    let store = CoverageStore::new();

    let coverage = match runner::run_baseline(device, &tests, &index, &store, options) {
        runner::BaselineResult::Failed(cause) => {
            output::print_error(&format!(
                "Tests fail before mutation. Fix failing tests first.\n{}",
                cause
            ));
            return 3;
        }
        runner::BaselineResult::Cancelled => {
            output::print_error("Run cancelled during the baseline.");
            return 3;
        }
        runner::BaselineResult::Ok { duration_ms, coverage } => {
            log::info!("Baseline of {} tests took {} ms", tests.len(), duration_ms);
            coverage
        }
    };

    match runner::run_mutations(device, &factories, &targets, &coverage, options) {
        Ok(results) => finalize_results(&results, json_mode, quiet),
        Err(droidmut::Error::Cancelled) => {
            output::print_error("Run cancelled. Original classes restored.");
            3
        }
        Err(e) => {
            output::print_error(&format!("Mutation run aborted: {}", e));
            3
        }
    }
}

fn summarize(results: &[MutantResult]) -> state::RunResult {
    let count = |status| results.iter().filter(|r| r.status == status).count();
    let killed = count(MutantStatus::Killed);
    let unviable = count(MutantStatus::Unviable);
    let total = results.len();
    let testable = total - unviable;
    let score = if testable > 0 {
        killed as f64 / testable as f64
    } else {
        1.0
    };

    let survived_mutants: Vec<state::SurvivedMutant> = results
        .iter()
        .filter(|r| matches!(r.status, MutantStatus::Survived | MutantStatus::NoCoverage))
        .enumerate()
        .map(|(i, r)| {
            let id = &r.details.id;
            state::SurvivedMutant {
                ref_id: format!("m{}", i + 1),
                class: id.class_name.replace('/', "."),
                file: r.details.source_file.clone().unwrap_or_else(|| id.class_name.clone()),
                line: r.details.line,
                method: id.method.clone(),
                policy: id.policy.clone(),
                description: id.description.clone(),
                status: r.status,
                diff: r.diff.clone(),
            }
        })
        .collect();

    state::RunResult {
        score,
        total,
        killed,
        survived: survived_mutants.len(),
        timeout: count(MutantStatus::Timeout),
        unviable,
        no_coverage: count(MutantStatus::NoCoverage),
        duration_ms: results.iter().map(|r| r.duration_ms).sum(),
        survived_mutants,
    }
}

fn finalize_results(results: &[MutantResult], json_mode: bool, quiet: bool) -> i32 {
    let run_result = summarize(results);
    state::save_last_run(&run_result);

    if !quiet {
        if json_mode {
            print_json(&run_result);
        } else {
            output::print_run_result(&run_result);
        }
    }

    if run_result.survived > 0 { 1 } else { 0 }
}

fn cmd_list(classes: &Path, requested: &[String], class_filter: Option<&str>, json_mode: bool) -> i32 {
    let factories = match select_mutators(requested) {
        Ok(f) => f,
        Err(code) => return code,
    };
    if !classes.is_dir() {
        output::print_error(&format!("Class directory not found: {}", classes.display()));
        return 2;
    }
    let targets = match runner::find_targets(classes, &factories, class_filter) {
        Ok(t) => t,
        Err(e) => {
            output::print_error(&format!("Failed to read classes: {}", e));
            return 3;
        }
    };
    let sites: Vec<_> = targets.into_iter().flat_map(|t| t.mutations).collect();
    if json_mode {
        print_json(&sites);
    } else if sites.is_empty() {
        output::print_success("No mutation sites found.");
    } else {
        output::print_mutation_sites(&sites);
    }
    0
}

fn cmd_show(mutant_ref: String, json_mode: bool) -> i32 {
    let ref_id = mutant_ref.trim_start_matches('@');

    let last_run = match state::load_last_run() {
        Some(r) => r,
        None => {
            output::print_error("No previous run found. Run `droidmut run` first.");
            return 2;
        }
    };

    match last_run.survived_mutants.iter().find(|m| m.ref_id == ref_id) {
        Some(m) => {
            if json_mode {
                print_json(m);
            } else {
                output::print_mutant_detail(m);
            }
            0
        }
        None => {
            let valid: Vec<_> = last_run
                .survived_mutants
                .iter()
                .map(|m| format!("@{}", m.ref_id))
                .collect();
            output::print_error(&format!(
                "Mutant @{} not found. Valid refs: {}",
                ref_id,
                valid.join(", ")
            ));
            2
        }
    }
}

fn cmd_status(json_mode: bool) -> i32 {
    match state::load_last_run() {
        Some(result) => {
            if json_mode {
                print_json(&result);
            } else {
                output::print_status(&result);
            }
            0
        }
        None => {
            output::print_error("No previous run found. Run `droidmut run` first.");
            2
        }
    }
}
