use regex::Regex;
use std::sync::OnceLock;

use crate::rules::{self, clean_phrase, position_phrase, sender_display_name};

/// Words that look like organizations to the capitalization heuristics but
/// never are. Role vocabulary is filtered separately, per tagger.
const ORG_BLOCKLIST: [&str; 16] = [
    "your", "you", "we", "our", "the", "thank", "thanks", "dear", "hello", "hi", "team",
    "application", "intern", "internship", "summer", "update",
];

/// Pattern-based entity tagger standing in for a statistical NER model:
/// organizations via contextual cues and capitalization, roles via a keyword
/// vocabulary with optional head nouns and an intern/internship tail.
pub struct EntityTagger {
    role_re: Regex,
}

impl EntityTagger {
    pub fn new(role_synonyms: &[String]) -> Self {
        let alternatives: Vec<String> = role_synonyms
            .iter()
            .map(|s| regex::escape(s.trim()).replace(' ', r"\s+"))
            .filter(|s| !s.is_empty())
            .collect();
        let vocab = if alternatives.is_empty() {
            "software|data|ml|ai".to_string()
        } else {
            alternatives.join("|")
        };
        let pattern = format!(
            r"(?i)\b(?:{vocab})(?:\s+(?:engineering|engineer|science|scientist|development|developer|learning))*\s+(?:intern|internship)\b",
        );
        Self {
            role_re: Regex::new(&pattern).unwrap(),
        }
    }

    /// Organization-type entities, in order of appearance.
    pub fn orgs(&self, text: &str) -> Vec<String> {
        static CUE: OnceLock<Regex> = OnceLock::new();
        static CAREERS: OnceLock<Regex> = OnceLock::new();
        static SUFFIX: OnceLock<Regex> = OnceLock::new();
        let cue = CUE.get_or_init(|| {
            Regex::new(
                r"\b(?:at|to|with|join|joining|from)\s+([A-Z][A-Za-z0-9&.]*(?:\s+[A-Z][A-Za-z0-9&.]*){0,2})",
            )
            .unwrap()
        });
        let careers = CAREERS.get_or_init(|| {
            Regex::new(
                r"\b([A-Z][A-Za-z0-9&.]*(?:\s+[A-Z][A-Za-z0-9&.]*)?)\s+(?:Careers|Recruiting|Talent|Hiring)\b",
            )
            .unwrap()
        });
        let suffix = SUFFIX.get_or_init(|| {
            Regex::new(
                r"\b([A-Z][A-Za-z0-9&.]*(?:\s+[A-Z][A-Za-z0-9&.]*)?)\s*,?\s+(?:Inc\b|LLC\b|Ltd\b|Corp\b|Labs\b|Technologies\b)",
            )
            .unwrap()
        });

        let mut found: Vec<(usize, String)> = Vec::new();
        for re in [cue, careers, suffix] {
            for cap in re.captures_iter(text) {
                let m = match cap.get(1) {
                    Some(m) => m,
                    None => continue,
                };
                if let Some(org) = self.trim_to_org(m.as_str()) {
                    found.push((m.start(), org));
                }
            }
        }
        found.sort_by_key(|(start, _)| *start);

        let mut orgs: Vec<String> = Vec::new();
        for (_, org) in found {
            if !orgs.iter().any(|seen| seen.eq_ignore_ascii_case(&org)) {
                orgs.push(org);
            }
        }
        orgs
    }

    /// Cut a captured capitalized run down to the organization tokens,
    /// dropping blocklisted and role-vocabulary words and everything after.
    fn trim_to_org(&self, capture: &str) -> Option<String> {
        let mut kept: Vec<&str> = Vec::new();
        for token in capture.split_whitespace() {
            let lower = token.to_lowercase();
            if ORG_BLOCKLIST.contains(&lower.as_str()) || self.role_re.is_match(&format!("{token} intern")) {
                break;
            }
            kept.push(token);
        }
        if kept.is_empty() {
            return None;
        }
        Some(kept.join(" "))
    }

    /// Role-type entities, in order of appearance.
    pub fn roles(&self, text: &str) -> Vec<String> {
        self.role_re
            .find_iter(text)
            .map(|m| clean_phrase(m.as_str()))
            .collect()
    }
}

/// Company cascade for the entity-based engines, ordered by decreasing
/// signal reliability: subject entities, a guarded "at <Capitalized>" form,
/// body entities, sender display name, domain allowlist, `Unknown`.
pub fn extract_company(tagger: &EntityTagger, subject: &str, from_header: &str, body: &str) -> String {
    static AT_CAP: OnceLock<Regex> = OnceLock::new();
    let at_cap =
        AT_CAP.get_or_init(|| Regex::new(r"\bat\s+([A-Z][A-Za-z0-9&.\- ]{2,})").unwrap());

    if let Some(org) = tagger.orgs(subject).into_iter().next() {
        return org;
    }
    if let Some(cap) = at_cap.captures(subject) {
        return clean_phrase(&cap[1]);
    }
    let body_head: String = body.chars().take(4000).collect();
    if let Some(org) = tagger.orgs(&body_head).into_iter().next() {
        return org;
    }
    let name = sender_display_name(from_header);
    if !name.is_empty() {
        return name;
    }
    if let Some(company) = rules::company_from_domain(from_header) {
        return company;
    }
    "Unknown".to_string()
}

/// Role cascade for the statistical engine: tagged role entity in the
/// subject, then the head of the body, then the "for the <phrase> position"
/// form, then the literal default.
pub fn extract_role(tagger: &EntityTagger, subject: &str, body: &str) -> String {
    if let Some(role) = tagger.roles(subject).into_iter().next() {
        return role;
    }
    let body_head: String = body.chars().take(1500).collect();
    if let Some(role) = tagger.roles(&body_head).into_iter().next() {
        return role;
    }
    if let Some(cap) = position_phrase().captures(subject) {
        return clean_phrase(&cap[1]);
    }
    "Intern".to_string()
}
