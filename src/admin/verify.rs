use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::open_store;
use crate::admin::Result;
use crate::storage::{CollectionName, Store};

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Recover the image and journal and count records.
    Fast,
    /// Also rebuild every secondary index and compare it with the live one.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Recovered condition worth knowing about.
    Warning,
    /// Index or record inconsistency.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Warning,
            message: message.into(),
        }
    }
}

/// Statistics collected during the verification process.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Records found across all collections.
    pub records: u64,
    /// Secondary index postings examined.
    pub index_entries: u64,
    /// Journal frames replayed on open.
    pub replayed_frames: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether no error-severity finding was recorded.
    pub success: bool,
    /// Issues discovered during verification.
    pub findings: Vec<VerifyFinding>,
    /// Figures about the data examined.
    pub counts: VerifyCounts,
}

/// Verifies the store under `path`.
///
/// Opening the store already checks the image checksum and replays the
/// journal; a corrupt image fails the call outright. A torn journal tail is
/// reported as a warning. At [`VerifyLevel::Full`] every secondary index is
/// recomputed from the stored records and primary keys are checked for
/// duplicates across the scan.
pub fn verify(
    path: impl AsRef<Path>,
    opts: &AdminOpenOptions,
    level: VerifyLevel,
) -> Result<VerifyReport> {
    let store = open_store(path.as_ref(), opts)?;
    verify_store(&store, level)
}

/// Verifies an already open store.
pub fn verify_store(store: &Store, level: VerifyLevel) -> Result<VerifyReport> {
    let mut findings = Vec::new();
    let mut counts = VerifyCounts::default();

    let stats = store.stats()?;
    if let Some(journal) = &stats.journal {
        counts.replayed_frames = journal.replayed_frames;
        if journal.torn_tail {
            push(
                &mut findings,
                VerifyFinding::warning(format!(
                    "journal ended on a torn tail; {} bytes discarded",
                    journal.discarded_bytes
                )),
            );
        }
    }
    for collection in &stats.collections {
        counts.records += collection.records as u64;
        counts.index_entries += collection
            .indexes
            .iter()
            .map(|index| index.entries as u64)
            .sum::<u64>();
    }

    if matches!(level, VerifyLevel::Full) {
        for problem in store.verify_indexes() {
            push(&mut findings, VerifyFinding::error(problem));
        }
        for name in CollectionName::ALL {
            check_keys(store, name, &mut findings)?;
        }
    }

    Ok(VerifyReport {
        level,
        success: !findings
            .iter()
            .any(|finding| finding.severity == VerifySeverity::Error),
        findings,
        counts,
    })
}

fn check_keys(store: &Store, name: CollectionName, findings: &mut Vec<VerifyFinding>) -> Result<()> {
    let field = name.schema().primary_key;
    let mut seen = BTreeSet::new();
    for record in store.scan_all(name)? {
        match record.get(field) {
            Some(Value::String(key)) => {
                if !seen.insert(key.clone()) {
                    push(findings, VerifyFinding::error(format!("{name}: duplicate key {key}")));
                }
            }
            _ => push(
                findings,
                VerifyFinding::error(format!("{name}: record without string '{field}'")),
            ),
        }
    }
    Ok(())
}

fn push(findings: &mut Vec<VerifyFinding>, finding: VerifyFinding) {
    if findings.len() < MAX_FINDINGS {
        findings.push(finding);
    }
}
