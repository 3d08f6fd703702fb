use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::mutants::MutantStatus;

pub const STATE_FILE: &str = ".droidmut-state.json";

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub score: f64,
    pub total: usize,
    pub killed: usize,
    pub survived: usize,
    pub timeout: usize,
    pub unviable: usize,
    #[serde(default)]
    pub no_coverage: usize,
    pub duration_ms: u64,
    pub survived_mutants: Vec<SurvivedMutant>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SurvivedMutant {
    pub ref_id: String,
    pub class: String,
    pub file: String,
    pub line: u32,
    pub method: String,
    pub policy: String,
    pub description: String,
    pub status: MutantStatus,
    pub diff: String,
}

fn state_path() -> PathBuf {
    let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    dir.join(STATE_FILE)
}

pub fn save_last_run(result: &RunResult) {
    save_to_path(result, &state_path());
}

pub fn load_last_run() -> Option<RunResult> {
    load_from_path(&state_path())
}

pub fn save_to_path(result: &RunResult, path: &std::path::Path) {
    match serde_json::to_string(result) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                log::warn!("could not save run state to {}: {}", path.display(), e);
            }
        }
        Err(e) => log::warn!("could not serialize run state: {}", e),
    }
}

pub fn load_from_path(path: &std::path::Path) -> Option<RunResult> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}
