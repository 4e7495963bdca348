use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Run configuration, loaded once at startup and never mutated. Missing
/// required keys fail here, before any message is fetched.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: AppConfig,
    pub mail: MailConfig,
    #[serde(default)]
    pub nlp: NlpConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_followup_days")]
    pub followup_days: i64,
    #[serde(default)]
    pub dry_run: bool,
    /// Offset applied when turning UTC timestamps into calendar dates.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            followup_days: default_followup_days(),
            dry_run: false,
            utc_offset_hours: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Directory of provider-shaped JSON message files.
    pub source_dir: PathBuf,
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpConfig {
    /// Active engine: "rules", "ner", or "semantic".
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_role_synonyms")]
    pub role_synonyms: Vec<String>,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            role_synonyms: default_role_synonyms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticConfig {
    #[serde(default = "default_status_labels")]
    pub status_labels: Vec<String>,
    #[serde(default = "default_role_probes")]
    pub role_probe_phrases: Vec<String>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            status_labels: default_status_labels(),
            role_probe_phrases: default_role_probes(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    /// Ledger database path; XDG data dir when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            calendar_id: default_calendar_id(),
        }
    }
}

fn default_followup_days() -> i64 {
    14
}

fn default_max_results() -> usize {
    200
}

fn default_engine() -> String {
    "rules".to_string()
}

fn default_role_synonyms() -> Vec<String> {
    ["software", "swe", "data", "machine learning", "ml", "ai", "computer", "backend", "frontend"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_status_labels() -> Vec<String> {
    ["Applied", "Interview", "OA", "Rejected", "Offer", "Other"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_role_probes() -> Vec<String> {
    [
        "software engineering intern",
        "data science intern",
        "machine learning intern",
        "research intern",
        "security intern",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        if settings.app.followup_days < 0 {
            return Err(anyhow!("app.followup_days must not be negative"));
        }
        Ok(settings)
    }

    fn default_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("APPLOG_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "applog") {
            Ok(proj_dirs.config_dir().join("config.json"))
        } else {
            Ok(PathBuf::from("applog.json"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"mail": {"source_dir": "/tmp/mail"}}"#).unwrap();
        assert_eq!(settings.app.followup_days, 14);
        assert_eq!(settings.mail.max_results, 200);
        assert_eq!(settings.nlp.engine, "rules");
        assert!(settings.reminders.enabled);
        assert_eq!(settings.semantic.status_labels.len(), 6);
    }

    #[test]
    fn test_missing_required_key_is_an_error() {
        let result: std::result::Result<Settings, _> = serde_json::from_str(r#"{"app": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "mail": {"source_dir": "/tmp/mail", "query": "from:jobs", "max_results": 50},
                "app": {"followup_days": 7, "dry_run": true},
                "nlp": {"engine": "semantic"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.app.followup_days, 7);
        assert!(settings.app.dry_run);
        assert_eq!(settings.mail.max_results, 50);
        assert_eq!(settings.nlp.engine, "semantic");
    }
}
