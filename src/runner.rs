use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use crate::chain::MutatorFactory;
use crate::classfile::{self, ClassFile};
use crate::config::DeviceConfig;
use crate::context::MutationDetails;
use crate::coverage::{self, CoverageStore, LineCoverage, LocationIndex};
use crate::device::{self, CancelFlag, TestOutcome};
use crate::discovery::TestUnit;
use crate::error::{Error, Result};
use crate::materializer;
use crate::mutants::{MutantResult, MutantStatus};
use crate::safety::ArtifactGuard;

pub const DEFAULT_PACKAGE_CMD: &str =
    "./gradlew installDebug -x javaPreCompileDebug -x compileDebugJavaWithJavac";

/// Repackaging is slow; it gets this many test timeouts.
const PACKAGE_TIMEOUT_FACTOR: u32 = 10;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Command that rebuilds and redeploys the application; `None` skips it.
    pub package_cmd: Option<String>,
    /// Directory the package command runs in.
    pub project_dir: PathBuf,
    pub timeout: Duration,
    /// Raised to stop the run; checked between tests and between mutants.
    pub cancel: CancelFlag,
}

impl RunOptions {
    fn package_timeout(&self) -> Duration {
        self.timeout.saturating_mul(PACKAGE_TIMEOUT_FACTOR)
    }
}

/// A class artifact and the mutation sites found in it.
#[derive(Debug, Clone)]
pub struct MutationTarget {
    pub artifact: PathBuf,
    pub class: ClassFile,
    pub mutations: Vec<MutationDetails>,
}

/// Scan `classes_dir` for mutation sites, optionally limited to classes whose
/// internal name starts with `class_filter`.
pub fn find_targets(
    classes_dir: &Path,
    factories: &[Box<dyn MutatorFactory>],
    class_filter: Option<&str>,
) -> Result<Vec<MutationTarget>> {
    let mut targets = Vec::new();
    for artifact in classfile::scan_artifacts(classes_dir)? {
        let class = ClassFile::read(&artifact)?;
        if class_filter.is_some_and(|f| !class.name.starts_with(f)) {
            continue;
        }
        let mutations = materializer::find_mutations(&class, factories);
        if mutations.is_empty() {
            continue;
        }
        log::debug!("{}: {} mutation sites", class.name, mutations.len());
        targets.push(MutationTarget { artifact, class, mutations });
    }
    Ok(targets)
}

/// Rebuild and redeploy the application. A failing build is only logged; a
/// command that cannot be started, or a cancelled run, is an error.
pub fn run_package_update(options: &RunOptions) -> Result<()> {
    package(options, &options.cancel)
}

fn package(options: &RunOptions, cancel: &CancelFlag) -> Result<()> {
    let Some((program, args)) = options.package_cmd.as_deref().and_then(device::parse_command) else {
        return Ok(());
    };
    let mut cmd = Command::new(&program);
    cmd.args(&args).current_dir(&options.project_dir);
    let output = device::run_cancellable(&mut cmd, options.package_timeout(), cancel)?;
    if output.cancelled {
        return Err(Error::Cancelled);
    }
    if output.timed_out() {
        log::warn!("Package update timed out");
    } else if !output.success() {
        log::warn!("Package update failed:\n{}", output.merged());
    }
    Ok(())
}

/// Per-test line coverage gathered during the baseline.
#[derive(Debug, Default)]
pub struct CoverageMap {
    /// `None` when no coverage could be collected for the test.
    pub tests: Vec<(TestUnit, Option<LineCoverage>)>,
}

impl CoverageMap {
    /// Tests that reach `line` of `class`. Tests without coverage data are
    /// assumed to reach everything; line 0 matches any covered line.
    pub fn covering_tests(&self, class: &str, line: u32) -> Vec<&TestUnit> {
        self.tests
            .iter()
            .filter(|(_, cov)| match cov {
                None => true,
                Some(cov) => cov
                    .get(class)
                    .is_some_and(|lines| line == 0 || lines.contains(&line)),
            })
            .map(|(test, _)| test)
            .collect()
    }
}

pub enum BaselineResult {
    Ok { duration_ms: u64, coverage: CoverageMap },
    Failed(String),
    Cancelled,
}

/// Run every test once against the unmutated application, recording what
/// each one covers.
pub fn run_baseline(
    config: &DeviceConfig,
    tests: &[TestUnit],
    index: &LocationIndex,
    store: &CoverageStore,
    options: &RunOptions,
) -> BaselineResult {
    let start = Instant::now();
    let mut coverage = CoverageMap::default();
    for test in tests {
        if options.cancel.is_cancelled() {
            return BaselineResult::Cancelled;
        }
        let run = device::run_instrumented(config, test, options.timeout, &options.cancel);
        match run.outcome {
            TestOutcome::Passed if options.cancel.is_cancelled() => return BaselineResult::Cancelled,
            TestOutcome::Passed => {}
            TestOutcome::Cancelled => return BaselineResult::Cancelled,
            TestOutcome::Failed(cause) | TestOutcome::NotExecuted(cause) => {
                return BaselineResult::Failed(format!("{}: {}", test, cause));
            }
            TestOutcome::TimedOut => {
                return BaselineResult::Failed(format!("{}: timed out", test));
            }
        }
        store.snapshot_and_reset();
        let lines = run.coverage.and_then(|bytes| match coverage::ingest(&bytes, index, store) {
            Ok(_) => Some(store.snapshot_and_reset()),
            Err(e) => {
                log::warn!("Ignoring coverage of {}: {}", test, e);
                None
            }
        });
        coverage.tests.push((test.clone(), lines));
    }
    BaselineResult::Ok {
        duration_ms: start.elapsed().as_millis() as u64,
        coverage,
    }
}

/// Run covering tests in order until one of them detects the mutant.
fn run_covering_tests(
    config: &DeviceConfig,
    tests: &[&TestUnit],
    options: &RunOptions,
) -> Result<(MutantStatus, Option<String>)> {
    for test in tests {
        if options.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match device::run_instrumented(config, test, options.timeout, &options.cancel).outcome {
            TestOutcome::Passed => {}
            TestOutcome::Failed(_) | TestOutcome::NotExecuted(_) => {
                return Ok((MutantStatus::Killed, Some(test.selector())));
            }
            TestOutcome::TimedOut => return Ok((MutantStatus::Timeout, Some(test.selector()))),
            TestOutcome::Cancelled => return Err(Error::Cancelled),
        }
    }
    if options.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok((MutantStatus::Survived, None))
}

/// Evaluate every mutant of every target, one at a time.
///
/// Only engine invariant violations, a failed restore of an original
/// artifact and cancellation abort the run; everything else becomes a mutant
/// status. The original application is redeployed in every case once at
/// least one mutant was installed.
pub fn run_mutations(
    config: &DeviceConfig,
    factories: &[Box<dyn MutatorFactory>],
    targets: &[MutationTarget],
    coverage: &CoverageMap,
    options: &RunOptions,
) -> Result<Vec<MutantResult>> {
    let mut results = Vec::new();
    let mut installed = false;
    let outcome = evaluate_all(config, factories, targets, coverage, options, &mut results, &mut installed);

    if installed {
        // Must run even after cancellation, so it gets a flag of its own.
        if let Err(e) = package(options, &CancelFlag::new()) {
            log::error!("Could not redeploy the original application: {}", e);
        }
    }
    outcome.map(|()| results)
}

fn evaluate_all(
    config: &DeviceConfig,
    factories: &[Box<dyn MutatorFactory>],
    targets: &[MutationTarget],
    coverage: &CoverageMap,
    options: &RunOptions,
    results: &mut Vec<MutantResult>,
    installed: &mut bool,
) -> Result<()> {
    for target in targets {
        for details in &target.mutations {
            if options.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let start = Instant::now();
            let tests = coverage.covering_tests(&target.class.name, details.line);
            if tests.is_empty() {
                results.push(MutantResult {
                    details: details.clone(),
                    status: MutantStatus::NoCoverage,
                    duration_ms: 0,
                    diff: String::new(),
                    detail: None,
                });
                continue;
            }

            let mutant = match materializer::materialize(&target.class, factories, &details.id) {
                Ok(m) => m,
                Err(e @ Error::InvariantViolation(_)) => return Err(e),
                Err(e) => {
                    results.push(MutantResult {
                        details: details.clone(),
                        status: MutantStatus::Unviable,
                        duration_ms: start.elapsed().as_millis() as u64,
                        diff: String::new(),
                        detail: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let guard = match ArtifactGuard::install(&target.artifact, &mutant.bytes) {
                Ok(g) => {
                    *installed = true;
                    g
                }
                Err(e) => {
                    results.push(MutantResult {
                        details: details.clone(),
                        status: MutantStatus::Unviable,
                        duration_ms: start.elapsed().as_millis() as u64,
                        diff: mutant.diff,
                        detail: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let evaluated = match run_package_update(options) {
                Ok(()) => run_covering_tests(config, &tests, options),
                Err(Error::Cancelled) => Err(Error::Cancelled),
                Err(e) => Ok((MutantStatus::Unviable, Some(e.to_string()))),
            };
            guard.restore()?;
            let (status, detail) = evaluated?;

            log::info!("{} -> {:?}", details.id, status);
            results.push(MutantResult {
                details: details.clone(),
                status,
                duration_ms: start.elapsed().as_millis() as u64,
                diff: mutant.diff,
                detail,
            });
        }
    }
    Ok(())
}
