use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

const TITLE_MARKER: &str = "标题";
const LEAD_MARKER: &str = "导语";
const BODY_MARKER: &str = "正文";
const STYLE_MARKER: &str = "风格说明";
const FALLBACK_TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lead: String,
    #[serde(default)]
    pub body: String,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        lead: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            lead: lead.into(),
            body: body.into(),
        }
    }

    /// Title, lead and body joined with single spaces.
    pub fn full_text(&self) -> String {
        format!("{} {} {}", self.title, self.lead, self.body)
    }

    pub fn paragraphs(&self) -> Vec<&str> {
        split_paragraphs(&self.body)
    }
}

/// Splits on blank lines, trimming and dropping empty paragraphs.
pub fn split_paragraphs(body: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                paragraphs.push(body[s..end].trim());
            }
            continue;
        }
        if start.is_none() {
            start = Some(line_start);
        }
        end = offset;
    }
    if let Some(s) = start {
        paragraphs.push(body[s..end].trim());
    }
    paragraphs
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOutput {
    pub article: Article,
    pub style_note: Option<String>,
    /// True when at least one section had to be recovered heuristically.
    pub parse_fallback: bool,
}

/// Reads `===标题===` / `===导语===` / `===正文===` sections out of generated text.
/// Missing sections degrade to best-effort extraction instead of an error.
pub fn parse_generation_output(text: &str) -> ParsedOutput {
    let sections = collect_sections(text);
    let mut parse_fallback = false;

    let title = match sections.get(TITLE_MARKER) {
        Some(section) => first_line(section).to_string(),
        None => {
            parse_fallback = true;
            fallback_title(text).unwrap_or_default()
        }
    };
    let lead = sections
        .get(LEAD_MARKER)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let body = match sections.get(BODY_MARKER) {
        Some(section) => section.trim().to_string(),
        None => {
            parse_fallback = true;
            fallback_body(text, &title)
        }
    };
    let style_note = sections
        .get(STYLE_MARKER)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if parse_fallback {
        warn!(
            sections = sections.len(),
            "generation output missing sections, using best-effort extraction"
        );
    }
    ParsedOutput {
        article: Article { title, lead, body },
        style_note,
        parse_fallback,
    }
}

fn collect_sections(text: &str) -> IndexMap<String, String> {
    let mut sections: IndexMap<String, String> = IndexMap::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        if let Some(name) = section_marker(line) {
            sections.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }
        if let Some(name) = &current {
            let section = sections.entry(name.clone()).or_default();
            section.push_str(line);
            section.push('\n');
        }
    }
    sections
}

fn section_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix("===")?.strip_suffix("===")?;
    let inner = inner.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

fn first_line(section: &str) -> &str {
    section
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

fn fallback_title(text: &str) -> Option<String> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && section_marker(line).is_none())?;
    if line.chars().count() < FALLBACK_TITLE_MAX_CHARS && !line.contains('。') {
        Some(line.to_string())
    } else {
        None
    }
}

fn fallback_body(text: &str, title: &str) -> String {
    let mut lines: Vec<&str> = text
        .lines()
        .filter(|line| section_marker(line).is_none())
        .collect();
    if !title.is_empty() {
        if let Some(pos) = lines.iter().position(|line| line.trim() == title) {
            lines.remove(pos);
        }
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marked_sections() {
        let raw = "===标题===\n山东烟草推进数字化转型\n===导语===\n今年以来，山东烟草持续发力。\n===正文===\n第一段。\n\n第二段。\n===风格说明===\n简洁\n";
        let parsed = parse_generation_output(raw);
        assert!(!parsed.parse_fallback);
        assert_eq!(parsed.article.title, "山东烟草推进数字化转型");
        assert_eq!(parsed.article.lead, "今年以来，山东烟草持续发力。");
        assert_eq!(parsed.article.body, "第一段。\n\n第二段。");
        assert_eq!(parsed.style_note.as_deref(), Some("简洁"));
    }

    #[test]
    fn falls_back_on_unstructured_output() {
        let raw = "数字化转型见成效\n全省累计投入资金，改造项目稳步推进。";
        let parsed = parse_generation_output(raw);
        assert!(parsed.parse_fallback);
        assert_eq!(parsed.article.title, "数字化转型见成效");
        assert_eq!(parsed.article.body, "全省累计投入资金，改造项目稳步推进。");
        assert!(parsed.article.lead.is_empty());
    }

    #[test]
    fn long_first_line_is_not_a_title() {
        let raw = "这是一段很长的正文内容。并没有标题。";
        let parsed = parse_generation_output(raw);
        assert!(parsed.article.title.is_empty());
        assert_eq!(parsed.article.body, raw);
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let body = "  第一段\n续行\n\n \n第二段\n\n\n第三段  ";
        assert_eq!(
            split_paragraphs(body),
            vec!["第一段\n续行", "第二段", "第三段"]
        );
        assert!(split_paragraphs("\n\n").is_empty());
    }
}
