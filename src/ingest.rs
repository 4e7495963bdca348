use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::config::Settings;
use crate::engine::Engine;
use crate::ledger::Ledger;
use crate::message::normalize;
use crate::models::{ExtractedRecord, LedgerRow, RunStats};
use crate::reminder::ReminderSink;
use crate::source::MailSource;
use crate::state::{ProcessingState, StateStore};

/// One batch ingestion pass. Owns nothing; every collaborator comes in as a
/// capability reference so engines, stores, and sources stay substitutable.
pub struct Ingestor<'a> {
    pub engine: &'a dyn Engine,
    pub source: &'a dyn MailSource,
    pub ledger: &'a dyn Ledger,
    pub reminders: &'a dyn ReminderSink,
    pub settings: &'a Settings,
    pub state_store: &'a StateStore,
}

impl Ingestor<'_> {
    /// Fetch → skip processed → normalize → parse → upsert → remind → mark.
    ///
    /// State is checkpointed after every successfully processed message, so
    /// a failure mid-batch aborts the rest of the run without losing the
    /// messages already finished. A failing list call degrades to an empty
    /// batch instead of an error.
    pub fn run(&self, state: &mut ProcessingState, dry_run: bool) -> Result<RunStats> {
        let dry_run = dry_run || self.settings.app.dry_run;
        let mut stats = RunStats::default();

        let ids = match self
            .source
            .list_candidates(&self.settings.mail.query, self.settings.mail.max_results)
        {
            Ok(ids) => ids,
            Err(e) => {
                eprintln!("[mail] listing candidates failed: {e:#}");
                Vec::new()
            }
        };
        stats.fetched = ids.len();
        if let Some(first) = ids.first() {
            state.last_message_id = Some(first.clone());
        }

        for id in &ids {
            if state.processed_ids.contains(id) {
                stats.skipped += 1;
                continue;
            }
            self.process_message(id, state, dry_run)
                .with_context(|| format!("Failed while processing message '{id}'"))?;
            stats.processed += 1;
        }

        self.state_store.save(state)?;
        Ok(stats)
    }

    fn process_message(&self, id: &str, state: &mut ProcessingState, dry_run: bool) -> Result<()> {
        let msg = self.source.fetch(id)?;
        let email = normalize(&msg);
        let received = msg.received_at();

        let parsed = self
            .engine
            .parse(&email.subject, &email.sender, &email.body, received);

        let record = ExtractedRecord {
            status: parsed.status,
            company: parsed.company,
            role: parsed.role,
            date_applied: parsed.date_applied,
            source_message_id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
        };

        let followup = record.date_applied + Duration::days(self.settings.app.followup_days);
        let applied_date = self.local_date(record.date_applied);
        let followup_date = self.local_date(followup);

        let row = LedgerRow::from_record(
            &record,
            self.local_timestamp(Utc::now()),
            applied_date.to_string(),
            followup_date.to_string(),
        );

        println!(
            "[PROCESS] {} | {} | {} | applied {} | follow-up {}",
            row.company, row.role, row.status, row.date_applied, row.followup_due
        );

        self.ledger.upsert_row(&row)?;

        if self.settings.reminders.enabled {
            let summary = format!("Follow up: {} \u{2014} {}", record.company, record.role);
            let description = format!("Auto-created by applog\nEmailId: {}", record.source_message_id);
            self.reminders.schedule(
                &self.settings.reminders.calendar_id,
                &summary,
                followup_date,
                &description,
                dry_run,
            )?;
        }

        state.processed_ids.insert(msg.id);
        self.state_store.save(state)?;
        Ok(())
    }

    fn local_date(&self, dt: DateTime<Utc>) -> NaiveDate {
        (dt + Duration::hours(self.settings.app.utc_offset_hours as i64)).date_naive()
    }

    fn local_timestamp(&self, dt: DateTime<Utc>) -> String {
        (dt + Duration::hours(self.settings.app.utc_offset_hours as i64))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::create_engine;
    use crate::message::{Header, MessagePart, PartBody, RawMessage};
    use crate::models::Status;
    use anyhow::anyhow;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeSource {
        messages: Vec<RawMessage>,
        fail_listing: bool,
    }

    impl MailSource for FakeSource {
        fn list_candidates(&self, _query: &str, max_results: usize) -> Result<Vec<String>> {
            if self.fail_listing {
                return Err(anyhow!("provider unavailable"));
            }
            Ok(self
                .messages
                .iter()
                .take(max_results)
                .map(|m| m.id.clone())
                .collect())
        }

        fn fetch(&self, id: &str) -> Result<RawMessage> {
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| anyhow!("no such message"))
        }
    }

    #[derive(Default)]
    struct FakeLedger {
        rows: RefCell<HashMap<String, LedgerRow>>,
        fail_on: Option<String>,
    }

    impl Ledger for FakeLedger {
        fn upsert_row(&self, row: &LedgerRow) -> Result<()> {
            if self.fail_on.as_deref() == Some(row.email_id.as_str()) {
                return Err(anyhow!("ledger write refused"));
            }
            self.rows.borrow_mut().insert(row.email_id.clone(), row.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        scheduled: RefCell<Vec<(String, NaiveDate, bool)>>,
    }

    impl ReminderSink for FakeSink {
        fn schedule(
            &self,
            _calendar_id: &str,
            summary: &str,
            due: NaiveDate,
            _description: &str,
            dry_run: bool,
        ) -> Result<Option<String>> {
            self.scheduled
                .borrow_mut()
                .push((summary.to_string(), due, dry_run));
            Ok(if dry_run { None } else { Some("r1".to_string()) })
        }
    }

    fn message(id: &str, date_ms: i64, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            thread_id: format!("t-{id}"),
            internal_date: date_ms.to_string(),
            payload: MessagePart {
                mime_type: "text/plain".to_string(),
                headers: vec![
                    Header {
                        name: "Subject".to_string(),
                        value: subject.to_string(),
                    },
                    Header {
                        name: "From".to_string(),
                        value: "Acme Careers <jobs@acme.com>".to_string(),
                    },
                ],
                body: PartBody {
                    data: Some(URL_SAFE_NO_PAD.encode(body.as_bytes())),
                },
                parts: vec![],
            },
        }
    }

    fn settings() -> Settings {
        serde_json::from_str(r#"{"mail": {"source_dir": "/tmp/mail"}}"#).unwrap()
    }

    fn temp_state(tag: &str) -> StateStore {
        let path = std::env::temp_dir().join(format!(
            "applog-ingest-{}-{}.json",
            std::process::id(),
            tag
        ));
        let _ = std::fs::remove_file(&path);
        StateStore::new(path)
    }

    // 2026-05-20 00:00:00 UTC
    const RECEIVED_MS: i64 = 1_779_235_200_000;

    #[test]
    fn test_happy_path_processes_and_marks() {
        let settings = settings();
        let engine = create_engine(&settings).unwrap();
        let source = FakeSource {
            messages: vec![message(
                "m1",
                RECEIVED_MS,
                "Thank you for applying to Acme for Software Engineering Intern",
                "We received your application.",
            )],
            fail_listing: false,
        };
        let ledger = FakeLedger::default();
        let sink = FakeSink::default();
        let state_store = temp_state("happy");
        let ingestor = Ingestor {
            engine: engine.as_ref(),
            source: &source,
            ledger: &ledger,
            reminders: &sink,
            settings: &settings,
            state_store: &state_store,
        };

        let mut state = ProcessingState::default();
        let stats = ingestor.run(&mut state, false).unwrap();

        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.skipped, 0);
        assert!(state.processed_ids.contains("m1"));
        assert_eq!(state.last_message_id.as_deref(), Some("m1"));

        let rows = ledger.rows.borrow();
        let row = rows.get("m1").unwrap();
        assert_eq!(row.status, Status::Applied);
        assert_eq!(row.thread_id, "t-m1");
        // No date in the text, so applied = received and follow-up is +14d.
        assert_eq!(row.date_applied, "2026-05-20");
        assert_eq!(row.followup_due, "2026-06-03");

        let scheduled = sink.scheduled.borrow();
        assert_eq!(scheduled.len(), 1);
        assert!(scheduled[0].0.starts_with("Follow up:"));
        assert!(!scheduled[0].2);

        // Durable state matches in-memory state.
        assert_eq!(state_store.load().unwrap(), state);
        let _ = std::fs::remove_file(state_store.path());
    }

    #[test]
    fn test_processed_ids_are_skipped_without_writes() {
        let settings = settings();
        let engine = create_engine(&settings).unwrap();
        let source = FakeSource {
            messages: vec![message("m1", RECEIVED_MS, "Interview at Acme", "interview")],
            fail_listing: false,
        };
        let ledger = FakeLedger::default();
        let sink = FakeSink::default();
        let state_store = temp_state("skip");
        let ingestor = Ingestor {
            engine: engine.as_ref(),
            source: &source,
            ledger: &ledger,
            reminders: &sink,
            settings: &settings,
            state_store: &state_store,
        };

        let mut state = ProcessingState::default();
        state.processed_ids.insert("m1".to_string());
        let stats = ingestor.run(&mut state, false).unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, 0);
        assert!(ledger.rows.borrow().is_empty());
        assert!(sink.scheduled.borrow().is_empty());
        let _ = std::fs::remove_file(state_store.path());
    }

    #[test]
    fn test_listing_failure_degrades_to_empty_batch() {
        let settings = settings();
        let engine = create_engine(&settings).unwrap();
        let source = FakeSource {
            messages: vec![],
            fail_listing: true,
        };
        let ledger = FakeLedger::default();
        let sink = FakeSink::default();
        let state_store = temp_state("listfail");
        let ingestor = Ingestor {
            engine: engine.as_ref(),
            source: &source,
            ledger: &ledger,
            reminders: &sink,
            settings: &settings,
            state_store: &state_store,
        };

        let mut state = ProcessingState::default();
        let stats = ingestor.run(&mut state, false).unwrap();
        assert_eq!(stats.fetched, 0);
        assert!(state.last_message_id.is_none());
        let _ = std::fs::remove_file(state_store.path());
    }

    #[test]
    fn test_midrun_failure_aborts_but_keeps_checkpoints() {
        let settings = settings();
        let engine = create_engine(&settings).unwrap();
        let source = FakeSource {
            messages: vec![
                message("m1", RECEIVED_MS + 2_000, "Interview at Acme", "interview"),
                message("m2", RECEIVED_MS + 1_000, "Interview at Globex", "interview"),
                message("m3", RECEIVED_MS, "Interview at Hooli", "interview"),
            ],
            fail_listing: false,
        };
        let ledger = FakeLedger {
            fail_on: Some("m2".to_string()),
            ..Default::default()
        };
        let sink = FakeSink::default();
        let state_store = temp_state("abort");
        let ingestor = Ingestor {
            engine: engine.as_ref(),
            source: &source,
            ledger: &ledger,
            reminders: &sink,
            settings: &settings,
            state_store: &state_store,
        };

        let mut state = ProcessingState::default();
        let err = ingestor.run(&mut state, false).unwrap_err();
        assert!(err.to_string().contains("m2"));

        // m1 landed and was checkpointed durably; m3 was never reached.
        assert!(ledger.rows.borrow().contains_key("m1"));
        assert!(!ledger.rows.borrow().contains_key("m3"));
        let durable = state_store.load().unwrap();
        assert!(durable.processed_ids.contains("m1"));
        assert!(!durable.processed_ids.contains("m2"));
        assert!(!durable.processed_ids.contains("m3"));
        let _ = std::fs::remove_file(state_store.path());
    }

    #[test]
    fn test_dry_run_reaches_sink_as_dry() {
        let settings = settings();
        let engine = create_engine(&settings).unwrap();
        let source = FakeSource {
            messages: vec![message("m1", RECEIVED_MS, "Interview at Acme", "interview")],
            fail_listing: false,
        };
        let ledger = FakeLedger::default();
        let sink = FakeSink::default();
        let state_store = temp_state("dry");
        let ingestor = Ingestor {
            engine: engine.as_ref(),
            source: &source,
            ledger: &ledger,
            reminders: &sink,
            settings: &settings,
            state_store: &state_store,
        };

        let mut state = ProcessingState::default();
        ingestor.run(&mut state, true).unwrap();
        let scheduled = sink.scheduled.borrow();
        assert_eq!(scheduled.len(), 1);
        assert!(scheduled[0].2, "sink should see the dry-run flag");
        let _ = std::fs::remove_file(state_store.path());
    }

    #[test]
    fn test_reminders_disabled_skips_sink() {
        let mut settings = settings();
        settings.reminders.enabled = false;
        let engine = create_engine(&settings).unwrap();
        let source = FakeSource {
            messages: vec![message("m1", RECEIVED_MS, "Interview at Acme", "interview")],
            fail_listing: false,
        };
        let ledger = FakeLedger::default();
        let sink = FakeSink::default();
        let state_store = temp_state("nosink");
        let ingestor = Ingestor {
            engine: engine.as_ref(),
            source: &source,
            ledger: &ledger,
            reminders: &sink,
            settings: &settings,
            state_store: &state_store,
        };

        let mut state = ProcessingState::default();
        ingestor.run(&mut state, false).unwrap();
        assert!(sink.scheduled.borrow().is_empty());
        assert_eq!(ledger.rows.borrow().len(), 1);
        let _ = std::fs::remove_file(state_store.path());
    }
}
