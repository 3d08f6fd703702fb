use serde::{Deserialize, Serialize};

use crate::context::MutationDetails;

/// A class with exactly one live mutation, serialized and ready to install.
#[derive(Debug, Clone)]
pub struct Mutant {
    pub details: MutationDetails,
    pub bytes: Vec<u8>,
    /// Line diff of the mutated method's listing.
    pub diff: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutantStatus {
    Killed,
    Survived,
    Timeout,
    Unviable,
    NoCoverage,
}

#[derive(Debug, Clone)]
pub struct MutantResult {
    pub details: MutationDetails,
    pub status: MutantStatus,
    pub duration_ms: u64,
    pub diff: String,
    /// Test that killed the mutant, or the failure cause when it was unviable.
    pub detail: Option<String>,
}
