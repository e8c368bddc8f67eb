//! Offline reconciliation checksum.
//!
//! Reads a JSON array of user or group representations (as exported from
//! the identity provider or the mirror) and prints the checksum the
//! reconciliation job would compute for it.

use std::path::Path;

use kc_audit::ChecksumReconciler;
use kc_model::{GroupSyncRecord, Snapshot, UserSyncRecord};
use serde::Serialize;

use crate::cli::{ChecksumArgs, RecordKind};
use crate::config::OutputFormat;
use crate::output::output_single;
use crate::{CliError, CliResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChecksumOutput {
    count: usize,
    checksum: String,
}

/// Runs the checksum command.
pub fn run_checksum(args: &ChecksumArgs, format: OutputFormat) -> CliResult<()> {
    let (count, checksum) = checksum_file(args.kind, &args.file)?;

    match format {
        OutputFormat::Quiet => println!("{checksum}"),
        _ => output_single(&ChecksumOutput { count, checksum }, format)?,
    }
    Ok(())
}

/// Computes the record count and checksum of a listing file.
pub fn checksum_file(kind: RecordKind, path: &Path) -> CliResult<(usize, String)> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    let items = value.as_array().ok_or_else(|| {
        CliError::Validation(format!("{} must contain a JSON array", path.display()))
    })?;

    let snapshots = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            Snapshot::from_json_object(item)
                .map_err(|e| CliError::Validation(format!("entry {i}: {e}")))
        })
        .collect::<CliResult<Vec<_>>>()?;

    let checksum = match kind {
        RecordKind::Users => {
            let records: Vec<_> = snapshots.iter().map(UserSyncRecord::from_snapshot).collect();
            ChecksumReconciler::compute_checksum(&records)
        }
        RecordKind::Groups => {
            let records: Vec<_> = snapshots.iter().map(GroupSyncRecord::from_snapshot).collect();
            ChecksumReconciler::compute_checksum(&records)
        }
    };

    Ok((snapshots.len(), checksum))
}
