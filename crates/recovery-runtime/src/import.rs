//! # Signature Import
//!
//! JSON Lines input, one `SignatureRecord` per line:
//!
//! ```text
//! {"id":1,"domain":"example.com","selector":"s1","headerHash":"9f..","dkimSignature":"base64..","timestamp":"2024-01-02T03:04:05Z"}
//! ```
//!
//! Blank lines are skipped. Records whose id is already stored are counted
//! as duplicates and left untouched.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use kr_01_key_recovery::{SignatureSource, StoreError};
use shared_types::SignatureRecord;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input: {0}")]
    Read(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Parse JSON Lines; the first bad line aborts with its 1-based number.
pub fn parse_signatures(reader: impl BufRead) -> Result<Vec<SignatureRecord>, ImportError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ImportError::Parse {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

pub fn read_signatures(path: &Path) -> Result<Vec<SignatureRecord>, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_signatures(BufReader::new(file))
}

/// Insert records into `store`, skipping ids it already has.
pub async fn import_signatures<S: SignatureSource + ?Sized>(
    store: &S,
    records: Vec<SignatureRecord>,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();
    for record in records {
        let id = record.id;
        match store.insert_signature(record).await {
            Ok(()) => summary.inserted += 1,
            Err(StoreError::Duplicate(_)) => {
                debug!(signature_id = id, "Signature already stored");
                summary.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "Signatures imported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kr_01_key_recovery::InMemoryRecoveryStore;
    use std::io::Cursor;

    const LINES: &str = r#"{"id":1,"domain":"example.com","selector":"s1","headerHash":"00","dkimSignature":"AQID","timestamp":"2024-01-02T03:04:05Z"}

{"id":2,"domain":"example.com","selector":"s1","headerHash":"01","dkimSignature":"BAUG"}
"#;

    #[test]
    fn test_parse_skips_blank_lines() {
        let records = parse_signatures(Cursor::new(LINES)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].signature, vec![1, 2, 3]);
        assert!(records[1].timestamp.is_none());
    }

    #[test]
    fn test_parse_reports_line_number() {
        let input = format!("{LINES}{{\"id\":3}}\n");
        match parse_signatures(Cursor::new(input)) {
            Err(ImportError::Parse { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = read_signatures(Path::new("/nonexistent/signatures.jsonl")).unwrap_err();
        assert!(matches!(err, ImportError::Open { .. }));
    }

    #[tokio::test]
    async fn test_import_counts_duplicates() {
        let store = InMemoryRecoveryStore::new();
        let records = parse_signatures(Cursor::new(LINES)).unwrap();

        let first = import_signatures(&store, records.clone()).await.unwrap();
        let second = import_signatures(&store, records).await.unwrap();

        assert_eq!(first, ImportSummary { inserted: 2, duplicates: 0 });
        assert_eq!(second, ImportSummary { inserted: 0, duplicates: 2 });
        assert_eq!(store.signature_count(), 2);
    }
}
