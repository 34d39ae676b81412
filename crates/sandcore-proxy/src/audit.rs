use sandcore_core::{billing::AuditEntry, CoreError, CoreResult};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only writer for one run's audit log. One entry is written per
/// observed LLM response, as a single line of JSON.
///
/// Writes are serialized behind an internal mutex rather than relying on
/// OS-level append atomicity across tasks, so a single `AuditWriter` can be
/// shared (`Arc`) between the proxy server's concurrently-handled requests.
pub struct AuditWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditWriter {
    /// Open (creating if absent) the audit log at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Append one entry.
    pub async fn append(&self, entry: &AuditEntry) -> CoreResult<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// The path this writer appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every entry from a run's audit log, in append order (ascending
/// timestamp, since entries are only ever appended).
///
/// A missing file is a valid result — the agent may have exited before any
/// LLM call completed — and returns an empty list rather than an error.
pub async fn read_audit_entries(path: impl AsRef<Path>) -> CoreResult<Vec<AuditEntry>> {
    let path = path.as_ref();
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CoreError::Io(e)),
    };

    let mut entries = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn entry(call_id: &str, cost: &str) -> AuditEntry {
        AuditEntry {
            litellm_call_id: call_id.to_string(),
            cost_usd: Decimal::from_str(cost).unwrap(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_then_read_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = AuditWriter::new(&path);

        writer.append(&entry("c-1", "0.001")).await.unwrap();
        writer.append(&entry("c-2", "0.002")).await.unwrap();

        let entries = read_audit_entries(&path).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].litellm_call_id, "c-1");
        assert_eq!(entries[1].litellm_call_id, "c-2");
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never_written.jsonl");
        let entries = read_audit_entries(&path).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave_or_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = std::sync::Arc::new(AuditWriter::new(&path));

        let mut handles = Vec::new();
        for i in 0..20 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                writer.append(&entry(&format!("c-{i}"), "0.001")).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let entries = read_audit_entries(&path).await.unwrap();
        assert_eq!(entries.len(), 20);
    }
}
