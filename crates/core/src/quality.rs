use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::patterns::{char_len, compile_or_default, DEFAULT_QUALITY_ORG_PATTERN, NUMBER_RE};

const MISSING_NUMBER_PENALTY: f64 = 0.3;
const NEW_NUMBER_PENALTY: f64 = 0.3;
const MISSING_ORG_PENALTY: f64 = 0.2;
const NEGATIVE_PHRASE_PENALTY: f64 = 0.1;
const PARAGRAPH_PENALTY_FACTOR: f64 = 0.8;
const ISSUE_SAMPLE: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LengthRange {
    pub min: usize,
    pub max: usize,
}

impl LengthRange {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, len: usize) -> bool {
        len >= self.min && len <= self.max
    }

    fn deviation(&self, len: usize) -> usize {
        if len < self.min {
            self.min - len
        } else if len > self.max {
            len - self.max
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CueGroup {
    pub name: String,
    pub keywords: Vec<String>,
}

impl CueGroup {
    fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    pub title_range: LengthRange,
    pub lead_range: LengthRange,
    pub paragraph_range: LengthRange,
    pub length_penalty_per_char: f64,
    pub length_score_floor: f64,
    pub terminology: Vec<String>,
    /// Distinct terms needed for a full terminology score.
    pub terminology_target: usize,
    pub negative_phrases: Vec<String>,
    /// Non-standard term to its standard replacement.
    pub term_corrections: IndexMap<String, String>,
    pub cue_groups: Vec<CueGroup>,
    /// Per-category overrides of `cue_groups`.
    pub category_cues: HashMap<String, Vec<CueGroup>>,
    pub org_patterns: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let words = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            title_range: LengthRange::new(15, 30),
            lead_range: LengthRange::new(60, 120),
            paragraph_range: LengthRange::new(3, 8),
            length_penalty_per_char: 0.02,
            length_score_floor: 0.7,
            terminology: words(&[
                "同比", "环比", "增长", "营收", "利润", "投资", "市场", "规模", "数字化", "高质量发展",
            ]),
            terminology_target: 3,
            negative_phrases: words(&[
                "惊人", "震撼", "轰动", "爆炸性", "史无前例", "空前绝后", "绝无仅有", "万无一失",
                "百分之百",
            ]),
            term_corrections: [
                ("卷烟厂", "卷烟工业企业"),
                ("烟厂", "卷烟工业企业"),
                ("专卖店", "烟草专卖零售店"),
                ("烟草局", "烟草专卖局"),
            ]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect(),
            cue_groups: vec![
                CueGroup::new("background", &["近年来", "今年以来", "为了", "随着", "面对"]),
                CueGroup::new("action", &["推进", "实施", "开展", "推出", "加大", "深化"]),
                CueGroup::new("result", &["成效", "提升", "增长", "降低", "实现", "数据显示"]),
            ],
            category_cues: HashMap::new(),
            org_patterns: vec![DEFAULT_QUALITY_ORG_PATTERN.to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyDetail {
    pub missing_numbers: Vec<String>,
    pub new_numbers: Vec<String>,
    pub missing_orgs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleDetail {
    pub title_chars: usize,
    pub lead_chars: usize,
    pub title_score: f64,
    pub lead_score: f64,
    pub terminology_count: usize,
    pub terminology_score: f64,
    pub negative_count: usize,
    pub negative_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureDetail {
    pub paragraph_count: usize,
    pub groups_present: Vec<String>,
    pub groups_missing: Vec<String>,
}

/// Rule-based score of one rewritten candidate. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub consistency_score: f64,
    pub style_score: f64,
    pub structure_score: f64,
    pub overall: f64,
    pub issues: Vec<String>,
    pub consistency: ConsistencyDetail,
    pub style: StyleDetail,
    pub structure: StructureDetail,
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
    org_patterns: Vec<Regex>,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        if config.terminology.is_empty() {
            warn!("terminology list is empty");
        }
        if config.cue_groups.is_empty() {
            warn!("no discourse cue groups configured");
        }
        let org_patterns =
            compile_or_default(&config.org_patterns, DEFAULT_QUALITY_ORG_PATTERN, "quality_org");
        Self {
            config,
            org_patterns,
        }
    }

    pub fn check(&self, candidate: &Article, original: &str, category: Option<&str>) -> QualityReport {
        let mut issues = Vec::new();
        let (consistency_score, consistency) = self.consistency(original, candidate, &mut issues);
        let (style_score, style) = self.style(candidate, &mut issues);
        let (structure_score, structure) = self.structure(candidate, category, &mut issues);
        let overall = round2(0.4 * consistency_score + 0.35 * style_score + 0.25 * structure_score);
        info!(
            overall,
            consistency = consistency_score,
            style = style_score,
            structure = structure_score,
            "quality check completed"
        );
        QualityReport {
            consistency_score,
            style_score,
            structure_score,
            overall,
            issues,
            consistency,
            style,
            structure,
        }
    }

    fn consistency(
        &self,
        original: &str,
        candidate: &Article,
        issues: &mut Vec<String>,
    ) -> (f64, ConsistencyDetail) {
        let text = candidate.full_text();
        let orig_numbers = spans(&NUMBER_RE, original);
        let cand_numbers = spans(&NUMBER_RE, &text);
        let orig_orgs = self.org_spans(original);
        let cand_orgs = self.org_spans(&text);

        let detail = ConsistencyDetail {
            missing_numbers: orig_numbers.difference(&cand_numbers).cloned().collect(),
            new_numbers: cand_numbers.difference(&orig_numbers).cloned().collect(),
            missing_orgs: orig_orgs.difference(&cand_orgs).cloned().collect(),
        };

        let mut score = 1.0;
        if !detail.missing_numbers.is_empty() {
            score -= MISSING_NUMBER_PENALTY;
            issues.push(format!("missing numbers: {}", sample(&detail.missing_numbers)));
        }
        if !detail.new_numbers.is_empty() {
            score -= NEW_NUMBER_PENALTY;
            issues.push(format!("new numbers: {}", sample(&detail.new_numbers)));
        }
        if !detail.missing_orgs.is_empty() {
            score -= MISSING_ORG_PENALTY;
            issues.push(format!("missing organizations: {}", sample(&detail.missing_orgs)));
        }
        let score = f64::max(0.0, score);
        debug!(score, "consistency scored");
        (score, detail)
    }

    fn style(&self, candidate: &Article, issues: &mut Vec<String>) -> (f64, StyleDetail) {
        let title_chars = char_len(&candidate.title);
        let lead_chars = char_len(&candidate.lead);
        let title_score = self.length_score(title_chars, self.config.title_range);
        let lead_score = self.length_score(lead_chars, self.config.lead_range);
        if title_score < 1.0 {
            issues.push(format!(
                "title length {title_chars} outside {}-{}",
                self.config.title_range.min, self.config.title_range.max
            ));
        }
        if lead_score < 1.0 {
            issues.push(format!(
                "lead length {lead_chars} outside {}-{}",
                self.config.lead_range.min, self.config.lead_range.max
            ));
        }

        let text = candidate.full_text();
        let terminology_count = self
            .config
            .terminology
            .iter()
            .filter(|term| !term.is_empty() && text.contains(term.as_str()))
            .count();
        let terminology_score = self.terminology_score(terminology_count);

        let mut negative_count = 0;
        for phrase in self.config.negative_phrases.iter().filter(|p| !p.is_empty()) {
            let hits = text.matches(phrase.as_str()).count();
            if hits > 0 {
                negative_count += hits;
                issues.push(format!("disallowed phrase: {phrase} (x{hits})"));
            }
        }
        let negative_score = f64::max(0.0, 1.0 - negative_count as f64 * NEGATIVE_PHRASE_PENALTY);

        for (from, to) in &self.config.term_corrections {
            if !from.is_empty() && text.contains(from.as_str()) && !text.contains(to.as_str()) {
                issues.push(format!("non-standard term: {from} -> {to}"));
            }
        }

        let score = 0.3 * title_score + 0.3 * lead_score + 0.3 * terminology_score + 0.1 * negative_score;
        debug!(score, title_chars, lead_chars, "style scored");
        (
            score,
            StyleDetail {
                title_chars,
                lead_chars,
                title_score,
                lead_score,
                terminology_count,
                terminology_score,
                negative_count,
                negative_score,
            },
        )
    }

    fn structure(
        &self,
        candidate: &Article,
        category: Option<&str>,
        issues: &mut Vec<String>,
    ) -> (f64, StructureDetail) {
        let groups = category
            .and_then(|c| self.config.category_cues.get(c))
            .unwrap_or(&self.config.cue_groups);
        let body = &candidate.body;
        let mut groups_present = Vec::new();
        let mut groups_missing = Vec::new();
        for group in groups {
            let present = group
                .keywords
                .iter()
                .any(|kw| !kw.is_empty() && body.contains(kw.as_str()));
            if present {
                groups_present.push(group.name.clone());
            } else {
                groups_missing.push(group.name.clone());
            }
        }
        let mut score = if groups.is_empty() {
            1.0
        } else {
            groups_present.len() as f64 / groups.len() as f64
        };
        if !groups_missing.is_empty() {
            issues.push(format!("missing structure: {}", groups_missing.join(", ")));
        }

        let paragraph_count = candidate.paragraphs().len();
        if !self.config.paragraph_range.contains(paragraph_count) {
            score *= PARAGRAPH_PENALTY_FACTOR;
            issues.push(format!(
                "paragraph count {paragraph_count} outside {}-{}",
                self.config.paragraph_range.min, self.config.paragraph_range.max
            ));
        }
        debug!(score, paragraph_count, "structure scored");
        (
            score,
            StructureDetail {
                paragraph_count,
                groups_present,
                groups_missing,
            },
        )
    }

    /// 1.0 inside the range, then a linear per-char penalty down to the floor.
    pub fn length_score(&self, len: usize, range: LengthRange) -> f64 {
        let deviation = range.deviation(len);
        if deviation == 0 {
            return 1.0;
        }
        let penalised = 1.0 - deviation as f64 * self.config.length_penalty_per_char;
        f64::max(self.config.length_score_floor, penalised)
    }

    fn terminology_score(&self, count: usize) -> f64 {
        let target = self
            .config
            .terminology_target
            .min(self.config.terminology.len());
        if target == 0 {
            return 1.0;
        }
        f64::min(1.0, count as f64 / target as f64)
    }

    fn org_spans(&self, text: &str) -> BTreeSet<String> {
        self.org_patterns
            .iter()
            .flat_map(|re| spans(re, text))
            .collect()
    }
}

fn spans(re: &Regex, text: &str) -> BTreeSet<String> {
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

fn sample(items: &[String]) -> String {
    items
        .iter()
        .take(ISSUE_SAMPLE)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
