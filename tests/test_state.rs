use droidmut::mutants::MutantStatus;
use droidmut::state::{self, RunResult, SurvivedMutant, STATE_FILE};
use tempfile::TempDir;

fn survivor(ref_id: &str, line: u32, status: MutantStatus) -> SurvivedMutant {
    SurvivedMutant {
        ref_id: ref_id.into(),
        class: "com/example/Net".into(),
        file: "Net.java".into(),
        line,
        method: "endpoints()V".into(),
        policy: "https_to_http".into(),
        description: "Changed 'https' to 'http' in String".into(),
        status,
        diff: "- ldc \"https://api.example.com\"\n+ ldc \"http://api.example.com\"\n".into(),
    }
}

fn result(survived_mutants: Vec<SurvivedMutant>) -> RunResult {
    RunResult {
        score: 0.5,
        total: 4,
        killed: 2,
        survived: 1,
        timeout: 0,
        unviable: 0,
        no_coverage: 1,
        duration_ms: 10000,
        survived_mutants,
    }
}

#[test]
fn run_result_serializes_to_json() {
    let json = serde_json::to_string(&result(vec![survivor("m1", 10, MutantStatus::Survived)])).unwrap();
    assert!(json.contains("\"score\":0.5"));
    assert!(json.contains("\"no_coverage\":1"));
    assert!(json.contains("\"ref_id\":\"m1\""));
    assert!(json.contains("\"status\":\"Survived\""));
}

#[test]
fn survived_mutant_serializes_all_fields() {
    let json = serde_json::to_string(&survivor("m3", 42, MutantStatus::NoCoverage)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["ref_id"], "m3");
    assert_eq!(parsed["class"], "com/example/Net");
    assert_eq!(parsed["file"], "Net.java");
    assert_eq!(parsed["line"], 42);
    assert_eq!(parsed["method"], "endpoints()V");
    assert_eq!(parsed["policy"], "https_to_http");
    assert_eq!(parsed["status"], "NoCoverage");
    assert!(parsed["diff"].as_str().unwrap().contains("http://api"));
}

#[test]
fn run_result_with_survivors_roundtrips() {
    let original = result(vec![
        survivor("m1", 10, MutantStatus::Survived),
        survivor("m2", 20, MutantStatus::NoCoverage),
    ]);
    let json = serde_json::to_string(&original).unwrap();
    let deserialized: RunResult = serde_json::from_str(&json).unwrap();

    assert_eq!(deserialized.survived_mutants.len(), 2);
    assert_eq!(deserialized.survived_mutants[1].ref_id, "m2");
    assert_eq!(deserialized.survived_mutants[1].status, MutantStatus::NoCoverage);
    assert_eq!(deserialized.no_coverage, 1);
}

#[test]
fn missing_no_coverage_defaults_to_zero() {
    let json = r#"{"score":1.0,"total":5,"killed":5,"survived":0,"timeout":0,"unviable":0,
                   "duration_ms":1234,"survived_mutants":[]}"#;
    let parsed: RunResult = serde_json::from_str(json).unwrap();
    assert_eq!(parsed.no_coverage, 0);
    assert_eq!(parsed.total, 5);
}

// --- File I/O tests ---

#[test]
fn save_and_load_roundtrip_via_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(STATE_FILE);

    state::save_to_path(&result(vec![survivor("m1", 5, MutantStatus::Survived)]), &path);
    assert!(path.exists(), "State file should be created");

    let loaded = state::load_from_path(&path).expect("Should load saved state");
    assert_eq!(loaded.score, 0.5);
    assert_eq!(loaded.killed, 2);
    assert_eq!(loaded.survived_mutants[0].line, 5);
}

#[test]
fn load_from_nonexistent_path_returns_none() {
    assert!(state::load_from_path(std::path::Path::new("/nonexistent/path/state.json")).is_none());
}

#[test]
fn load_from_invalid_json_returns_none() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "not valid json").unwrap();
    assert!(state::load_from_path(&path).is_none());
}

#[test]
fn save_to_unwritable_path_does_not_panic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing-dir").join(STATE_FILE);
    state::save_to_path(&result(vec![]), &path);
    assert!(!path.exists());
}
