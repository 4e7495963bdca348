use regex::Regex;
use std::sync::OnceLock;

use crate::models::Status;

/// Ordered status rules: first match wins, so the order is a priority.
/// Rejection, interview, and assessment language co-occurs with generic
/// "application received" boilerplate and must be checked first.
pub struct StatusRules {
    rules: Vec<(Status, Regex)>,
}

impl StatusRules {
    pub fn new() -> Self {
        let table: [(Status, &str); 4] = [
            (
                Status::Rejected,
                r"(?:\bwe regret\b|\bunfortunately\b|\bnot moving forward\b|\bdeclined\b)",
            ),
            (
                Status::Interview,
                r"(?:\binterview\b|\bschedule time\b|\bbook a time\b|\bphone screen\b|\bscreening\b)",
            ),
            (
                Status::Oa,
                r"(?:\bonline assessment\b|\bcoding challenge\b|\bhackerrank\b|\bcodility\b|\bassessment\b)",
            ),
            (
                Status::Applied,
                r"(?:\bapplication confirmation\b|\bapplication received\b|\bthank you for applying\b|\bthank you for your application\b|\bwe(?:\s+have)?\s+received your application\b|\bwe'?ve received your application\b|\bconfirm that your application\b|\bhas been received\b|\bthank you for your interest\b)",
            ),
        ];
        let rules = table
            .into_iter()
            .map(|(status, pattern)| (status, Regex::new(pattern).unwrap()))
            .collect();
        Self { rules }
    }

    pub fn classify(&self, subject: &str, body: &str) -> Status {
        let text = format!("{}\n{}", subject, body).to_lowercase();
        for (status, pattern) in &self.rules {
            if pattern.is_match(&text) {
                return *status;
            }
        }
        Status::Other
    }
}

impl Default for StatusRules {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim separator punctuation a captured phrase tends to drag along.
pub fn clean_phrase(s: &str) -> String {
    s.trim_matches(|c: char| matches!(c, ' ' | '-' | '\u{2014}' | '|' | ':'))
        .to_string()
}

/// Rule-based company cascade: "at <name>" in the subject, then
/// "application to/for <name>", then the sender display name.
pub fn extract_company(subject: &str, from_header: &str) -> String {
    static AT: OnceLock<Regex> = OnceLock::new();
    static APPLICATION: OnceLock<Regex> = OnceLock::new();
    let at = AT.get_or_init(|| Regex::new(r"\bat\s+([A-Za-z0-9&.\- ]{2,})").unwrap());
    let application = APPLICATION
        .get_or_init(|| Regex::new(r"(?i)application (?:to|for)\s+([A-Za-z0-9&.\- ]{2,})").unwrap());

    if let Some(cap) = at.captures(subject) {
        return clean_phrase(&cap[1]);
    }
    if let Some(cap) = application.captures(subject) {
        return clean_phrase(&cap[1]);
    }
    let name = sender_display_name(from_header);
    if !name.is_empty() {
        return name;
    }
    "Unknown".to_string()
}

/// Display name portion of a From header ("Acme Careers <x@acme.com>"),
/// stripped of quotes. Empty when the header carries only an address.
pub fn sender_display_name(from_header: &str) -> String {
    let name = match from_header.find('<') {
        Some(idx) => &from_header[..idx],
        None => from_header,
    };
    name.trim().trim_matches('"').trim().to_string()
}

/// Last-resort mapping for senders whose display name says nothing useful.
pub fn company_from_domain(from_header: &str) -> Option<String> {
    static DOMAIN: OnceLock<Regex> = OnceLock::new();
    let domain_re = DOMAIN.get_or_init(|| Regex::new(r"@([^>\s]+)>?").unwrap());
    let domain = domain_re.captures(from_header)?.get(1)?.as_str().to_lowercase();

    const KNOWN: [(&str, &str); 4] = [
        ("netflix.com", "Netflix"),
        ("amazon.jobs", "Amazon"),
        ("metacareers.com", "Meta"),
        ("myworkday.com", "Workday"),
    ];
    KNOWN
        .iter()
        .find(|(dom, _)| domain.ends_with(dom))
        .map(|(_, company)| (*company).to_string())
}

fn role_hint() -> &'static Regex {
    static HINT: OnceLock<Regex> = OnceLock::new();
    HINT.get_or_init(|| {
        Regex::new(
            r"(?i)(software|swe|data|machine\s*learning|ml|ai|computer|backend|frontend)[^.\n]{0,40}\b(intern|internship)\b",
        )
        .unwrap()
    })
}

pub fn position_phrase() -> &'static Regex {
    static POSITION: OnceLock<Regex> = OnceLock::new();
    POSITION.get_or_init(|| Regex::new(r"(?i)for the (.*?) position").unwrap())
}

/// Rule-based role cascade: keyword hint in the subject, then the body,
/// then a "for the <phrase> position" capture, then the literal default.
pub fn extract_role(subject: &str, body: &str) -> String {
    if let Some(m) = role_hint().find(subject) {
        return clean_phrase(m.as_str());
    }
    if let Some(m) = role_hint().find(body) {
        return clean_phrase(m.as_str());
    }
    if let Some(cap) = position_phrase().captures(subject) {
        return clean_phrase(&cap[1]);
    }
    "Intern".to_string()
}
