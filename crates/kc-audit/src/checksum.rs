//! Order-independent checksums over record collections.
//!
//! Two listings of the same entities produce the same digest regardless of
//! listing order, so the identity provider and the mirror can be compared
//! without transferring full state.

use aws_lc_rs::digest;

use crate::canonical::Canonicalize;

/// SHA-384 of the empty input, the checksum of an empty collection.
pub const EMPTY_CHECKSUM: &str = "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da274edebfe76f65fbd51ad2f14898b95b";

/// Computes reconciliation checksums.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumReconciler;

impl ChecksumReconciler {
    /// Computes the checksum of a collection of records.
    ///
    /// Canonical strings are sorted by byte order, then each is fed into
    /// SHA-384 as an 8-byte big-endian length prefix followed by its bytes.
    /// The digest is returned as 96 lowercase hex characters.
    #[must_use]
    pub fn compute_checksum<R: Canonicalize>(records: &[R]) -> String {
        let mut canonical: Vec<String> = records.iter().map(Canonicalize::canonicalize).collect();
        canonical.sort_unstable();

        let mut context = digest::Context::new(&digest::SHA384);
        for record in &canonical {
            context.update(&(record.len() as u64).to_be_bytes());
            context.update(record.as_bytes());
        }

        hex::encode(context.finish().as_ref())
    }
}
