//! Parser for the raw (`-r`) output of `am instrument`.

const FAILED_MARKER: &str = "INSTRUMENTATION_FAILED";
const STATUS_MARKER: &str = "INSTRUMENTATION_STATUS: ";
const STATUS_CODE_MARKER: &str = "INSTRUMENTATION_STATUS_CODE: ";
const TEST_START_MARKER: &str = "INSTRUMENTATION_STATUS_CODE: 1";
const ERROR_KEY: &str = "Error=";
const COVERAGE_KEY: &str = "coverageFilePath=";

/// Upper bound on status lines inspected while looking for an error cause.
pub const MAX_STATUS_SCAN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedRunResult {
    /// The test ran to completion, whatever its result.
    pub executed: bool,
    pub passed: bool,
    pub failure_cause: Option<String>,
    /// Coverage file location on the device.
    pub coverage_path: Option<String>,
}

impl InstrumentedRunResult {
    pub fn not_executed(cause: impl Into<String>) -> Self {
        InstrumentedRunResult {
            executed: false,
            passed: false,
            failure_cause: Some(cause.into()),
            coverage_path: None,
        }
    }

    fn executed(passed: bool, coverage_path: Option<String>) -> Self {
        InstrumentedRunResult {
            executed: true,
            passed,
            failure_cause: None,
            coverage_path,
        }
    }
}

/// Text from `from` up to the end of its line, without the line terminator.
fn rest_of_line(text: &str, from: usize) -> &str {
    let rest = &text[from..];
    let end = rest.find('\n').unwrap_or(rest.len());
    rest[..end].trim_end_matches('\r')
}

fn failure_cause(output: &str) -> String {
    output
        .match_indices(STATUS_MARKER)
        .take(MAX_STATUS_SCAN)
        .find_map(|(pos, _)| {
            rest_of_line(output, pos + STATUS_MARKER.len())
                .strip_prefix(ERROR_KEY)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "<cause unknown>".to_string())
}

/// Parse the captured output of a single-test instrumentation run.
///
/// Only one test runs per invocation, so the status code that follows the
/// test-start marker is that test's result.
pub fn parse_runner_output(output: &str) -> InstrumentedRunResult {
    if output.contains(FAILED_MARKER) {
        let cause = failure_cause(output);
        log::error!("Instrumentation invocation failed: {}", cause);
        return InstrumentedRunResult::not_executed(cause);
    }

    let Some(start) = output.find(TEST_START_MARKER) else {
        log::error!("Could not find test result in command output");
        return InstrumentedRunResult::not_executed("Could not find test result in command output");
    };
    let after_start = start + TEST_START_MARKER.len();
    let Some(rel) = output[after_start..].find(STATUS_CODE_MARKER) else {
        log::error!("Could not find test result in command output");
        return InstrumentedRunResult::not_executed("Could not find test result in command output");
    };
    let value_pos = after_start + rel + STATUS_CODE_MARKER.len();
    let value = rest_of_line(output, value_pos).trim();
    log::info!("Test result: {}", value);

    let coverage_path = output[after_start..]
        .find(COVERAGE_KEY)
        .map(|pos| rest_of_line(output, after_start + pos + COVERAGE_KEY.len()).trim().to_string())
        .filter(|p| !p.is_empty());

    match value.parse::<i32>() {
        Ok(0) => InstrumentedRunResult::executed(true, coverage_path),
        Ok(code) if code < 0 => InstrumentedRunResult::executed(false, coverage_path),
        Ok(code) => {
            log::warn!("Unexpected test result value: {}", code);
            InstrumentedRunResult {
                failure_cause: Some(format!("Unexpected test result value: {}", code)),
                ..InstrumentedRunResult::executed(false, coverage_path)
            }
        }
        Err(_) => {
            log::error!("Could not parse result string ({})", value);
            InstrumentedRunResult::not_executed(format!("Could not parse result string ({})", value))
        }
    }
}
