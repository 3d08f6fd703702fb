use droidmut::protocol::{parse_runner_output, InstrumentedRunResult, MAX_STATUS_SCAN};

fn run_output(code: &str) -> String {
    format!(
        "INSTRUMENTATION_STATUS: class=com.example.NetTest\n\
         INSTRUMENTATION_STATUS: current=1\n\
         INSTRUMENTATION_STATUS: test=testFetch\n\
         INSTRUMENTATION_STATUS_CODE: 1\n\
         INSTRUMENTATION_STATUS: class=com.example.NetTest\n\
         INSTRUMENTATION_STATUS: test=testFetch\n\
         INSTRUMENTATION_STATUS_CODE: {}\n\
         INSTRUMENTATION_RESULT: stream=\n\
         OK (1 test)\n\
         INSTRUMENTATION_RESULT: coverageFilePath=/data/user/0/com.example/files/coverage.ec\n\
         INSTRUMENTATION_CODE: -1\n",
        code
    )
}

#[test]
fn status_zero_is_a_pass() {
    let result = parse_runner_output(&run_output("0"));
    assert!(result.executed);
    assert!(result.passed);
    assert_eq!(result.failure_cause, None);
}

#[test]
fn negative_status_is_a_failure() {
    let result = parse_runner_output(&run_output("-2"));
    assert!(result.executed);
    assert!(!result.passed);
}

#[test]
fn minimal_pass_output() {
    let result = parse_runner_output("INSTRUMENTATION_STATUS_CODE: 1\n...\nINSTRUMENTATION_STATUS_CODE: 0\n");
    assert!(result.executed && result.passed);
    assert_eq!(result.coverage_path, None);
}

#[test]
fn unexpected_status_value_fails_with_cause() {
    let result = parse_runner_output("INSTRUMENTATION_STATUS_CODE: 1\n...\nINSTRUMENTATION_STATUS_CODE: 3\n");
    assert!(result.executed);
    assert!(!result.passed);
    assert_eq!(result.failure_cause.as_deref(), Some("Unexpected test result value: 3"));
}

#[test]
fn non_numeric_status_is_not_executed() {
    let result = parse_runner_output("INSTRUMENTATION_STATUS_CODE: 1\nINSTRUMENTATION_STATUS_CODE: boom\n");
    assert!(!result.executed);
    assert_eq!(result.failure_cause.as_deref(), Some("Could not parse result string (boom)"));
}

#[test]
fn instrumentation_failure_extracts_error() {
    let output = "INSTRUMENTATION_STATUS: id=ActivityManagerService\n\
                  INSTRUMENTATION_STATUS: Error=Foo\n\
                  INSTRUMENTATION_STATUS_CODE: -1\n\
                  android.util.AndroidException: INSTRUMENTATION_FAILED: com.example.test/Runner\n";
    let result = parse_runner_output(output);
    assert_eq!(result, InstrumentedRunResult::not_executed("Foo"));
}

#[test]
fn instrumentation_failure_without_error_line() {
    let result = parse_runner_output("INSTRUMENTATION_FAILED: com.example.test/Runner\n");
    assert!(!result.executed);
    assert_eq!(result.failure_cause.as_deref(), Some("<cause unknown>"));
}

#[test]
fn error_scan_is_bounded() {
    let mut output = String::from("INSTRUMENTATION_FAILED\n");
    for i in 0..MAX_STATUS_SCAN {
        output.push_str(&format!("INSTRUMENTATION_STATUS: key{}=v\n", i));
    }
    output.push_str("INSTRUMENTATION_STATUS: Error=TooLate\n");
    let result = parse_runner_output(&output);
    assert_eq!(result.failure_cause.as_deref(), Some("<cause unknown>"));
}

#[test]
fn missing_markers_report_result_not_found() {
    let result = parse_runner_output("adb: device offline\n");
    assert!(!result.executed);
    assert_eq!(
        result.failure_cause.as_deref(),
        Some("Could not find test result in command output")
    );
}

#[test]
fn start_marker_without_result_is_not_found() {
    let result = parse_runner_output("INSTRUMENTATION_STATUS_CODE: 1\nINSTRUMENTATION_STATUS: test=x\n");
    assert!(!result.executed);
}

#[test]
fn coverage_path_is_captured() {
    let result = parse_runner_output(&run_output("0"));
    assert_eq!(
        result.coverage_path.as_deref(),
        Some("/data/user/0/com.example/files/coverage.ec")
    );
}

#[test]
fn carriage_returns_are_tolerated() {
    let output = run_output("-1").replace('\n', "\r\n");
    let result = parse_runner_output(&output);
    assert!(result.executed);
    assert!(!result.passed);
    assert_eq!(
        result.coverage_path.as_deref(),
        Some("/data/user/0/com.example/files/coverage.ec")
    );
}
