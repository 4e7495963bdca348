use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};

use crate::message::{RawMessage, normalize};

/// Capability interface over the mail provider: list candidate message ids
/// for a query, fetch one message in full.
pub trait MailSource {
    fn list_candidates(&self, query: &str, max_results: usize) -> Result<Vec<String>>;

    fn fetch(&self, id: &str) -> Result<RawMessage>;
}

/// Reads provider-shaped JSON message files (`<id>.json`) from a directory,
/// newest first. Stands in for the provider API client, which is out of
/// scope here; exports made with `gmail-export`-style tooling drop straight
/// into the directory.
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_all(&self) -> Result<Vec<RawMessage>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read mail directory: {}", self.dir.display()))?;
        let mut messages = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let msg = read_message_file(&path)?;
            messages.push(msg);
        }
        // Provider order: newest arrival first.
        messages.sort_by(|a, b| b.received_at().cmp(&a.received_at()));
        Ok(messages)
    }
}

/// Parse one provider-shaped JSON message file.
pub fn read_message_file(path: &Path) -> Result<RawMessage> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read message file: {}", path.display()))?;
    let msg: RawMessage = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid message file: {}", path.display()))?;
    if msg.id.is_empty() {
        return Err(anyhow!("Message file has no id: {}", path.display()));
    }
    Ok(msg)
}

impl MailSource for JsonDirSource {
    fn list_candidates(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        // Plain query terms are matched against subject and sender;
        // provider-specific operators (anything with a colon) are ignored.
        let terms: Vec<String> = query
            .split_whitespace()
            .filter(|t| !t.contains(':'))
            .map(|t| t.to_lowercase())
            .collect();

        let mut ids = Vec::new();
        for msg in self.load_all()? {
            if !terms.is_empty() {
                let email = normalize(&msg);
                let haystack = format!("{}\n{}", email.subject, email.sender).to_lowercase();
                if !terms.iter().all(|t| haystack.contains(t)) {
                    continue;
                }
            }
            ids.push(msg.id);
            if ids.len() >= max_results {
                break;
            }
        }
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> Result<RawMessage> {
        let direct = self.dir.join(format!("{id}.json"));
        if direct.is_file() {
            return read_message_file(&direct);
        }
        // File names do not have to match ids; fall back to a scan.
        for msg in self.load_all()? {
            if msg.id == id {
                return Ok(msg);
            }
        }
        Err(anyhow!("Message '{}' not found in {}", id, self.dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Header, MessagePart, PartBody};
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    struct TempMailDir {
        dir: PathBuf,
    }

    impl TempMailDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("applog-src-{}-{}", std::process::id(), tag));
            std::fs::create_dir_all(&dir).unwrap();
            Self { dir }
        }

        fn write(&self, msg: &RawMessage) {
            let path = self.dir.join(format!("{}.json", msg.id));
            std::fs::write(path, serde_json::to_string(msg).unwrap()).unwrap();
        }
    }

    impl Drop for TempMailDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn message(id: &str, date_ms: i64, subject: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            thread_id: format!("t-{id}"),
            internal_date: date_ms.to_string(),
            payload: MessagePart {
                mime_type: "text/plain".to_string(),
                headers: vec![Header {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                }],
                body: PartBody {
                    data: Some(URL_SAFE_NO_PAD.encode(b"body text")),
                },
                parts: vec![],
            },
        }
    }

    #[test]
    fn test_list_newest_first_and_capped() {
        let tmp = TempMailDir::new("order");
        tmp.write(&message("old", 1_000, "first"));
        tmp.write(&message("mid", 2_000, "second"));
        tmp.write(&message("new", 3_000, "third"));

        let source = JsonDirSource::new(&tmp.dir);
        let ids = source.list_candidates("", 10).unwrap();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let capped = source.list_candidates("", 2).unwrap();
        assert_eq!(capped, vec!["new", "mid"]);
    }

    #[test]
    fn test_query_terms_filter_subjects() {
        let tmp = TempMailDir::new("query");
        tmp.write(&message("a", 2_000, "Your application to Acme"));
        tmp.write(&message("b", 1_000, "Weekly newsletter"));

        let source = JsonDirSource::new(&tmp.dir);
        let ids = source.list_candidates("application subject:ignored", 10).unwrap();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_fetch_by_id() {
        let tmp = TempMailDir::new("fetch");
        tmp.write(&message("m42", 1_000, "hello"));

        let source = JsonDirSource::new(&tmp.dir);
        let msg = source.fetch("m42").unwrap();
        assert_eq!(msg.thread_id, "t-m42");
        assert!(source.fetch("missing").is_err());
    }
}
