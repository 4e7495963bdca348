use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::config::Settings;
use crate::dates;
use crate::embed::{Embedder, cosine};
use crate::models::Status;
use crate::ner::{self, EntityTagger};
use crate::rules::{self, StatusRules, clean_phrase, position_phrase};

/// The four extracted fields for one message. Total by construction: every
/// engine degrades to the documented defaults rather than failing.
#[derive(Debug, Clone)]
pub struct ParsedFields {
    pub status: Status,
    pub company: String,
    pub role: String,
    pub date_applied: DateTime<Utc>,
}

/// One interchangeable extraction strategy. The ingestion loop only ever
/// talks to this trait; variants must be substitutable behind it.
pub trait Engine {
    fn name(&self) -> &'static str;

    fn parse(
        &self,
        subject: &str,
        sender: &str,
        body: &str,
        fallback_date: DateTime<Utc>,
    ) -> ParsedFields;
}

/// Select the engine named in the config. The returned value owns whatever
/// model state its variant needs; heavier state is built lazily on first
/// parse and cached for the rest of the run.
pub fn create_engine(settings: &Settings) -> Result<Box<dyn Engine>> {
    match settings.nlp.engine.as_str() {
        "rules" => Ok(Box::new(RuleEngine::new())),
        "ner" => Ok(Box::new(NerEngine::new(&settings.nlp.role_synonyms))),
        "semantic" => Ok(Box::new(SemanticEngine::new(
            &settings.nlp.role_synonyms,
            settings.semantic.status_labels.clone(),
            settings.semantic.role_probe_phrases.clone(),
        ))),
        other => Err(anyhow!(
            "Unknown engine '{}'. Available: rules (default), ner, semantic",
            other
        )),
    }
}

// --- Rule engine ---

/// Regex-only variant: ordered status rules plus the pattern cascades.
pub struct RuleEngine {
    rules: StatusRules,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rules: StatusRules::new(),
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for RuleEngine {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn parse(
        &self,
        subject: &str,
        sender: &str,
        body: &str,
        fallback_date: DateTime<Utc>,
    ) -> ParsedFields {
        ParsedFields {
            status: self.rules.classify(subject, body),
            company: rules::extract_company(subject, sender),
            role: rules::extract_role(subject, body),
            date_applied: dates::extract_date(subject, body, fallback_date),
        }
    }
}

// --- Statistical engine ---

/// Entity-tagger variant: organization and role entities with the rule
/// cascades as fallback; status still comes from the ordered rules.
pub struct NerEngine {
    rules: StatusRules,
    tagger: EntityTagger,
}

impl NerEngine {
    pub fn new(role_synonyms: &[String]) -> Self {
        Self {
            rules: StatusRules::new(),
            tagger: EntityTagger::new(role_synonyms),
        }
    }
}

impl Engine for NerEngine {
    fn name(&self) -> &'static str {
        "ner"
    }

    fn parse(
        &self,
        subject: &str,
        sender: &str,
        body: &str,
        fallback_date: DateTime<Utc>,
    ) -> ParsedFields {
        ParsedFields {
            status: self.rules.classify(subject, body),
            company: ner::extract_company(&self.tagger, subject, sender, body),
            role: ner::extract_role(&self.tagger, subject, body),
            date_applied: dates::extract_date(subject, body, fallback_date),
        }
    }
}

// --- Semantic engine ---

struct SemanticModel {
    embedder: Embedder,
    probe_vecs: Vec<Vec<f32>>,
    /// One prototype vector set per configured status label.
    label_vecs: Vec<(String, Vec<Vec<f32>>)>,
}

/// Embedding-similarity variant: zero-shot status over the configured label
/// set, entity-based company extraction, and probe-scored role candidates.
pub struct SemanticEngine {
    tagger: EntityTagger,
    status_labels: Vec<String>,
    probe_phrases: Vec<String>,
    model: OnceLock<SemanticModel>,
}

impl SemanticEngine {
    pub fn new(
        role_synonyms: &[String],
        status_labels: Vec<String>,
        probe_phrases: Vec<String>,
    ) -> Self {
        Self {
            tagger: EntityTagger::new(role_synonyms),
            status_labels,
            probe_phrases,
            model: OnceLock::new(),
        }
    }

    /// Built at most once per run, on first use.
    fn model(&self) -> &SemanticModel {
        self.model.get_or_init(|| {
            let embedder = Embedder::new();
            let probe_vecs = self
                .probe_phrases
                .iter()
                .map(|p| embedder.embed(p))
                .collect();
            let label_vecs = self
                .status_labels
                .iter()
                .map(|label| {
                    let vecs = label_prototypes(label)
                        .iter()
                        .map(|p| embedder.embed(p))
                        .collect();
                    (label.clone(), vecs)
                })
                .collect();
            SemanticModel {
                embedder,
                probe_vecs,
                label_vecs,
            }
        })
    }

    /// Zero-shot multi-class decision: the top-ranked label wins.
    fn classify(&self, subject: &str, body: &str) -> Status {
        let model = self.model();
        let head: String = body.chars().take(600).collect();
        let text_vec = model.embedder.embed(&format!("{subject}\n{head}"));

        let mut best: Option<(&str, f32)> = None;
        for (label, protos) in &model.label_vecs {
            let score = protos
                .iter()
                .map(|p| cosine(&text_vec, p))
                .fold(f32::MIN, f32::max);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((label, score));
            }
        }
        best.filter(|(_, score)| *score > 0.0)
            .and_then(|(label, _)| label.parse().ok())
            .unwrap_or(Status::Other)
    }

    fn extract_role(&self, subject: &str, body: &str) -> String {
        let model = self.model();
        let candidates = candidate_role_phrases(subject, body);

        let mut best_idx = 0;
        let mut best_score = f32::MIN;
        for (idx, cand) in candidates.iter().enumerate() {
            let vec = model.embedder.embed(cand);
            let score = model
                .probe_vecs
                .iter()
                .map(|p| cosine(&vec, p))
                .fold(f32::MIN, f32::max);
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }
        polish_role(&candidates[best_idx])
    }
}

impl Engine for SemanticEngine {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn parse(
        &self,
        subject: &str,
        sender: &str,
        body: &str,
        fallback_date: DateTime<Utc>,
    ) -> ParsedFields {
        ParsedFields {
            status: self.classify(subject, body),
            company: ner::extract_company(&self.tagger, subject, sender, body),
            role: self.extract_role(subject, body),
            date_applied: dates::extract_date(subject, body, fallback_date),
        }
    }
}

/// Anchor phrases for each known status label; unknown labels are scored
/// against their own name only.
fn label_prototypes(label: &str) -> Vec<String> {
    let extra: &[&str] = match label.to_lowercase().as_str() {
        "applied" => &[
            "thank you for applying",
            "we received your application",
            "application confirmation",
        ],
        "interview" => &[
            "schedule your interview",
            "phone screen invitation",
            "book a time to talk",
        ],
        "oa" => &[
            "complete the online assessment",
            "coding challenge invitation",
            "hackerrank assessment link",
        ],
        "rejected" => &[
            "we regret to inform you",
            "we will not be moving forward",
            "unfortunately your application was declined",
        ],
        "offer" => &[
            "pleased to extend an offer",
            "your offer letter is attached",
            "congratulations on your offer",
        ],
        _ => &[],
    };
    std::iter::once(label.to_string())
        .chain(extra.iter().map(|s| s.to_string()))
        .collect()
}

/// Deduplicated role candidates pulled from the text. Guaranteed non-empty:
/// the literal fallback "intern" is always present when nothing else is.
pub fn candidate_role_phrases(subject: &str, body: &str) -> Vec<String> {
    static INTERN_PHRASE: OnceLock<Regex> = OnceLock::new();
    let intern_phrase = INTERN_PHRASE.get_or_init(|| {
        Regex::new(r"(?i)([A-Za-z/ &\-]{3,80}?\b(?:internship|intern)\b)").unwrap()
    });
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").unwrap());

    let text = format!("{subject}\n\n{body}");
    let mut candidates: Vec<String> = Vec::new();

    let mut push_unique = |phrase: String| {
        if phrase.is_empty() || candidates.len() >= 20 {
            return;
        }
        // Collapse near-duplicates; the first spelling wins.
        let duplicate = candidates
            .iter()
            .any(|seen| strsim::jaro_winkler(seen, &phrase) > 0.92);
        if !duplicate {
            candidates.push(phrase);
        }
    };

    for cap in intern_phrase.captures_iter(&text) {
        let phrase = clean_phrase(&cap[1]).to_lowercase();
        push_unique(spaces.replace_all(&phrase, " ").into_owned());
    }
    for cap in position_phrase().captures_iter(&text) {
        push_unique(clean_phrase(&cap[1]).to_lowercase());
    }

    if candidates.is_empty() {
        candidates.push("intern".to_string());
    }
    candidates
}

/// Title-case the winning phrase, then restore known acronym casing.
fn polish_role(role: &str) -> String {
    static ML: OnceLock<Regex> = OnceLock::new();
    static AI: OnceLock<Regex> = OnceLock::new();
    let ml = ML.get_or_init(|| Regex::new(r"(?i)\bml\b").unwrap());
    let ai = AI.get_or_init(|| Regex::new(r"(?i)\bai\b").unwrap());

    let titled = role
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let titled = ml.replace_all(&titled, "ML");
    ai.replace_all(&titled, "AI").into_owned()
}
