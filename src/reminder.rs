use anyhow::Result;
use chrono::NaiveDate;

/// Capability interface over the reminder/calendar collaborator. In dry-run
/// mode implementations print a "would create" line and schedule nothing.
pub trait ReminderSink {
    fn schedule(
        &self,
        calendar_id: &str,
        summary: &str,
        due: NaiveDate,
        description: &str,
        dry_run: bool,
    ) -> Result<Option<String>>;
}
