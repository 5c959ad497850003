//! Input file validation.

use std::path::PathBuf;

use super::types::{ProbeError, ProbeResult};

/// Check that every input path exists as a file.
///
/// Reports all missing paths at once, in input order.
pub fn validate_inputs(paths: &[PathBuf]) -> ProbeResult<()> {
    let missing: Vec<PathBuf> = paths.iter().filter(|p| !p.is_file()).cloned().collect();

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::warn!("[Input] {} of {} video files missing", missing.len(), paths.len());
        Err(ProbeError::MissingInputs(missing))
    }
}
