use std::collections::HashSet;
use std::ops::Range;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::patterns::{
    compile_all, compile_or_default, placeholder, DATE_RE, DEFAULT_ORG_PATTERN, NUMBER_RE,
    PLACEHOLDER_RE, UNIT_FIGURE_RE,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Organization names matched by exact containment before any pattern runs.
    pub org_whitelist: Vec<String>,
    /// Regex fragments for pattern-based organization names.
    pub org_patterns: Vec<String>,
    /// Rewritten numbers matching any of these are accepted as format normalization.
    pub numeric_allow_patterns: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            org_whitelist: vec!["国家烟草专卖局".to_string(), "中国烟草总公司".to_string()],
            org_patterns: vec![DEFAULT_ORG_PATTERN.to_string()],
            numeric_allow_patterns: vec![r"^\d{1,3}(,\d{3})+(\.\d+)?".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Date,
    Number,
    Organization,
}

impl EntityKind {
    pub fn key_prefix(&self) -> &'static str {
        match self {
            EntityKind::Date => "DATE",
            EntityKind::Number => "NUM",
            EntityKind::Organization => "ORG",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        let prefix = key.split('_').next()?;
        match prefix {
            "DATE" => Some(EntityKind::Date),
            "NUM" => Some(EntityKind::Number),
            "ORG" => Some(EntityKind::Organization),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    pub value: String,
    pub placeholder_key: String,
}

impl ExtractedEntity {
    pub fn placeholder(&self) -> String {
        placeholder(&self.placeholder_key)
    }
}

/// Placeholder key to original value, in the order the keys were created.
/// Owned by a single rewrite request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderMap {
    entries: IndexMap<String, String>,
}

impl PlaceholderMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values_of(&self, kind: EntityKind) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(key, _)| EntityKind::from_key(key) == Some(kind))
            .map(|(_, value)| value.clone())
            .collect()
    }

    fn insert(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakReport {
    pub has_leak: bool,
    pub leaked_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub text: String,
    pub leak: LeakReport,
    /// Mapped keys whose placeholder never appeared in the decoded text.
    pub unused_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberCheck {
    pub is_valid: bool,
    pub new_numbers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedEntities {
    pub dates: Vec<String>,
    pub numbers: Vec<String>,
    pub orgs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityVerification {
    pub is_valid: bool,
    pub missing_entities: Vec<String>,
    pub new_numbers: Vec<String>,
    pub leak: LeakReport,
    pub locked: LockedEntities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrictNumberReport {
    pub is_valid: bool,
    pub violations: Vec<String>,
    pub original_figures: Vec<String>,
    pub rewritten_figures: Vec<String>,
}

/// Protects dates, numbers and organization names across an opaque rewrite.
#[derive(Debug, Clone)]
pub struct EntityGuard {
    whitelist: Vec<String>,
    org_patterns: Vec<Regex>,
    numeric_allow: Vec<Regex>,
}

impl Default for EntityGuard {
    fn default() -> Self {
        Self::new(&GuardConfig::default())
    }
}

impl EntityGuard {
    pub fn new(config: &GuardConfig) -> Self {
        if config.org_whitelist.is_empty() {
            warn!("organization whitelist is empty");
        }
        let org_patterns = compile_or_default(&config.org_patterns, DEFAULT_ORG_PATTERN, "org");
        let numeric_allow = compile_all(&config.numeric_allow_patterns, "numeric_allow");
        info!(
            whitelist = config.org_whitelist.len(),
            org_patterns = org_patterns.len(),
            "entity guard ready"
        );
        Self {
            whitelist: config.org_whitelist.clone(),
            org_patterns,
            numeric_allow,
        }
    }

    /// Extracts protected spans: dates, then numbers outside date spans, then
    /// whitelisted organizations, then pattern organizations.
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut collector = Collector::default();

        let mut date_spans: Vec<Range<usize>> = Vec::new();
        for m in DATE_RE.find_iter(text) {
            date_spans.push(m.range());
            collector.push(EntityKind::Date, m.as_str());
        }

        let mut number_spans: Vec<Range<usize>> = Vec::new();
        for m in NUMBER_RE.find_iter(text) {
            if overlaps_any(&date_spans, &m.range()) {
                continue;
            }
            number_spans.push(m.range());
            collector.push(EntityKind::Number, m.as_str());
        }

        let mut org_spans: Vec<Range<usize>> = Vec::new();
        for org in &self.whitelist {
            if org.is_empty() {
                continue;
            }
            let mut found = false;
            for (start, _) in text.match_indices(org.as_str()) {
                org_spans.push(start..start + org.len());
                found = true;
            }
            if found {
                collector.push(EntityKind::Organization, org);
            }
        }

        // Dates, numbers and whitelisted names are already claimed; patterns
        // only see the text between them.
        let mut claimed = date_spans;
        claimed.extend(number_spans);
        claimed.extend(org_spans.iter().cloned());
        let free = gaps(text.len(), &claimed);
        for pattern in &self.org_patterns {
            for gap in &free {
                for m in pattern.find_iter(&text[gap.clone()]) {
                    let range = gap.start + m.start()..gap.start + m.end();
                    if overlaps_any(&org_spans, &range) || overlaps_any(&claimed, &range) {
                        continue;
                    }
                    org_spans.push(range);
                    collector.push(EntityKind::Organization, m.as_str());
                }
            }
        }

        info!(count = collector.entities.len(), "extracted entities");
        collector.entities
    }

    /// Replaces each entity's first free occurrence with its placeholder, longest
    /// values first. Occurrences inside an already placed placeholder are skipped.
    pub fn encode(&self, text: &str, entities: &[ExtractedEntity]) -> (String, PlaceholderMap) {
        let mut ordered: Vec<&ExtractedEntity> = entities.iter().collect();
        ordered.sort_by(|a, b| b.value.len().cmp(&a.value.len()));

        let mut result = text.to_string();
        let mut mapping = PlaceholderMap::default();
        for entity in ordered {
            if entity.value.is_empty() {
                continue;
            }
            match first_free_occurrence(&result, &entity.value) {
                Some(start) => {
                    result.replace_range(start..start + entity.value.len(), &entity.placeholder());
                }
                None => {
                    debug!(key = %entity.placeholder_key, "entity has no free occurrence");
                }
            }
            mapping.insert(entity.placeholder_key.clone(), entity.value.clone());
        }
        info!(placeholders = mapping.len(), "encoded entities");
        (result, mapping)
    }

    /// Restores every placeholder occurrence. Leaks are logged, not raised.
    pub fn decode(&self, text: &str, mapping: &PlaceholderMap) -> String {
        self.decode_with_report(text, mapping).text
    }

    pub fn decode_with_report(&self, text: &str, mapping: &PlaceholderMap) -> Decoded {
        let mut result = text.to_string();
        let mut unused_keys = Vec::new();
        for (key, value) in mapping.iter() {
            let token = placeholder(key);
            if result.contains(&token) {
                result = result.replace(&token, value);
            } else {
                unused_keys.push(key.to_string());
            }
        }
        let leak = self.detect_leak(&result);
        if leak.has_leak {
            warn!(leaked = ?leak.leaked_keys, "placeholder leak detected");
        }
        if !unused_keys.is_empty() {
            warn!(keys = ?unused_keys, "placeholders missing from generated text");
        }
        Decoded {
            text: result,
            leak,
            unused_keys,
        }
    }

    pub fn detect_leak(&self, text: &str) -> LeakReport {
        let leaked_keys: Vec<String> = PLACEHOLDER_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();
        LeakReport {
            has_leak: !leaked_keys.is_empty(),
            leaked_keys,
        }
    }

    /// Flags numbers in `rewritten` that the original never contained.
    pub fn check_new_numbers(&self, original: &str, rewritten: &str) -> NumberCheck {
        let mut known: HashSet<String> = HashSet::new();
        for m in NUMBER_RE.find_iter(original) {
            known.insert(m.as_str().to_string());
            known.insert(strip_separators(m.as_str()));
        }

        let mut seen = HashSet::new();
        let mut new_numbers = Vec::new();
        for m in NUMBER_RE.find_iter(rewritten) {
            let number = m.as_str();
            if !seen.insert(number) {
                continue;
            }
            if known.contains(number) || known.contains(&strip_separators(number)) {
                continue;
            }
            if self.numeric_allow.iter().any(|re| re.is_match(number)) {
                continue;
            }
            new_numbers.push(number.to_string());
        }

        if !new_numbers.is_empty() {
            warn!(numbers = ?new_numbers, "new numbers detected");
        }
        NumberCheck {
            is_valid: new_numbers.is_empty(),
            new_numbers,
        }
    }

    pub fn verify(
        &self,
        original: &str,
        rewritten: &str,
        mapping: &PlaceholderMap,
    ) -> EntityVerification {
        let mut missing_entities = Vec::new();
        for (key, value) in mapping.iter() {
            if !rewritten.contains(value) {
                warn!(key, value, "missing entity");
                missing_entities.push(value.to_string());
            }
        }
        let numbers = self.check_new_numbers(original, rewritten);
        let leak = self.detect_leak(rewritten);
        let locked = LockedEntities {
            dates: mapping.values_of(EntityKind::Date),
            numbers: mapping.values_of(EntityKind::Number),
            orgs: mapping.values_of(EntityKind::Organization),
        };
        EntityVerification {
            is_valid: missing_entities.is_empty() && numbers.is_valid && !leak.has_leak,
            missing_entities,
            new_numbers: numbers.new_numbers,
            leak,
            locked,
        }
    }

    /// Two-way comparison of unit-bearing figures: anything added or lost is a violation.
    pub fn strict_number_check(&self, original: &str, rewritten: &str) -> StrictNumberReport {
        let original_figures: Vec<String> = UNIT_FIGURE_RE
            .find_iter(original)
            .map(|m| m.as_str().to_string())
            .collect();
        let rewritten_figures: Vec<String> = UNIT_FIGURE_RE
            .find_iter(rewritten)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut violations = Vec::new();
        for figure in &rewritten_figures {
            if !original_figures.contains(figure) {
                violations.push(format!("new figure: {figure}"));
            }
        }
        for figure in &original_figures {
            if !rewritten_figures.contains(figure) {
                violations.push(format!("lost figure: {figure}"));
            }
        }
        StrictNumberReport {
            is_valid: violations.is_empty(),
            violations,
            original_figures,
            rewritten_figures,
        }
    }
}

#[derive(Default)]
struct Collector {
    entities: Vec<ExtractedEntity>,
    seen: HashSet<(EntityKind, String)>,
    dates: usize,
    numbers: usize,
    orgs: usize,
}

impl Collector {
    fn push(&mut self, kind: EntityKind, value: &str) {
        if !self.seen.insert((kind, value.to_string())) {
            return;
        }
        let counter = match kind {
            EntityKind::Date => &mut self.dates,
            EntityKind::Number => &mut self.numbers,
            EntityKind::Organization => &mut self.orgs,
        };
        *counter += 1;
        let placeholder_key = format!("{}_{}", kind.key_prefix(), counter);
        debug!(?kind, value, key = %placeholder_key, "extracted entity");
        self.entities.push(ExtractedEntity {
            kind,
            value: value.to_string(),
            placeholder_key,
        });
    }
}

fn overlaps_any(spans: &[Range<usize>], candidate: &Range<usize>) -> bool {
    spans
        .iter()
        .any(|span| span.start < candidate.end && candidate.start < span.end)
}

/// Byte ranges of `len` not covered by any span.
fn gaps(len: usize, spans: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut sorted = spans.to_vec();
    sorted.sort_by_key(|span| span.start);
    let mut free = Vec::new();
    let mut cursor = 0;
    for span in sorted {
        if span.start > cursor {
            free.push(cursor..span.start);
        }
        cursor = cursor.max(span.end);
    }
    if cursor < len {
        free.push(cursor..len);
    }
    free
}

fn first_free_occurrence(text: &str, value: &str) -> Option<usize> {
    let taken: Vec<Range<usize>> = PLACEHOLDER_RE.find_iter(text).map(|m| m.range()).collect();
    text.match_indices(value)
        .map(|(start, _)| start)
        .find(|start| !overlaps_any(&taken, &(*start..*start + value.len())))
}

fn strip_separators(number: &str) -> String {
    number.chars().filter(|c| *c != ',').collect()
}
