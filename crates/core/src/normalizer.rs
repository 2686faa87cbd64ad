use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::article::{split_paragraphs, Article};
use crate::patterns::{char_len, DATE_RE, TITLE_FIGURE_RE};

const ELLIPSIS: &str = "...";
const SENTENCE_ENDS: [char; 3] = ['。', '！', '？'];
const SENTENCE_CUT_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizerConfig {
    pub title_min_chars: usize,
    pub title_max_chars: usize,
    pub lead_min_chars: usize,
    pub lead_max_chars: usize,
    /// Categories whose titles lead with their first figure.
    pub data_led_categories: Vec<String>,
    pub figure_separator: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            title_min_chars: 5,
            title_max_chars: 15,
            lead_min_chars: 40,
            lead_max_chars: 80,
            data_led_categories: vec!["economic_data".to_string()],
            figure_separator: "：".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, article: &Article, category: &str) -> Article {
        let processed = Article {
            title: self.process_title(&article.title, category),
            lead: self.process_lead(&article.lead),
            body: self.process_body(&article.body),
        };
        debug!(title = %processed.title, category, "normalized article");
        processed
    }

    pub fn process_title(&self, title: &str, category: &str) -> String {
        if title.trim().is_empty() {
            return String::new();
        }
        let mut title: String = title.chars().filter(|c| *c != '!' && *c != '！').collect();
        if self
            .config
            .data_led_categories
            .iter()
            .any(|c| c == category)
        {
            title = self.lead_with_figure(&title);
        }
        let len = char_len(&title);
        if len > self.config.title_max_chars {
            title = title.chars().take(self.config.title_max_chars).collect();
            title.push_str(ELLIPSIS);
        } else if len < self.config.title_min_chars {
            warn!(title = %title, len, "title shorter than minimum");
        }
        title.trim().to_string()
    }

    fn lead_with_figure(&self, title: &str) -> String {
        let dates: Vec<_> = DATE_RE.find_iter(title).map(|d| d.range()).collect();
        let figure = TITLE_FIGURE_RE
            .find_iter(title)
            .find(|m| !dates.iter().any(|d| d.start < m.end() && m.start() < d.end));
        let Some(m) = figure else {
            return title.to_string();
        };
        let figure = m.as_str();
        let mut rest = String::with_capacity(title.len());
        rest.push_str(&title[..m.start()]);
        rest.push_str(&title[m.end()..]);
        let rest = rest.trim().trim_start_matches(['：', ':']).trim();
        format!("{figure}{}{rest}", self.config.figure_separator)
    }

    pub fn process_lead(&self, lead: &str) -> String {
        if lead.trim().is_empty() {
            return String::new();
        }
        let mut lead = collapse_whitespace(lead);
        let len = char_len(&lead);
        if len < self.config.lead_min_chars {
            warn!(len, "lead shorter than minimum");
        } else if len > self.config.lead_max_chars {
            lead = smart_truncate(&lead, self.config.lead_max_chars);
        }
        normalize_punctuation(&lead).trim().to_string()
    }

    pub fn process_body(&self, body: &str) -> String {
        let body = body.replace("\r\n", "\n");
        split_paragraphs(&body)
            .into_iter()
            .map(normalize_punctuation)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !prev_space {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(ch);
            prev_space = false;
        }
    }
    result
}

/// Cuts at the last sentence end past 70% of `max_chars`, else hard-cuts with an ellipsis.
pub fn smart_truncate(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let window = &chars[..max_chars];
    let last_end = window.iter().rposition(|c| SENTENCE_ENDS.contains(c));
    match last_end {
        Some(idx) if idx as f64 > max_chars as f64 * SENTENCE_CUT_RATIO => {
            window[..=idx].iter().collect()
        }
        _ => {
            let keep = max_chars.saturating_sub(ELLIPSIS.len());
            let mut cut: String = window[..keep].iter().collect();
            cut.push_str(ELLIPSIS);
            cut
        }
    }
}

fn full_width(ch: char) -> Option<char> {
    match ch {
        ',' => Some('，'),
        ';' => Some('；'),
        ':' => Some('：'),
        '!' => Some('！'),
        '?' => Some('？'),
        _ => None,
    }
}

/// Neighbours that keep an ASCII mark as-is: digits and path or scheme separators.
fn protects(neighbour: Option<char>) -> bool {
    matches!(neighbour, Some(c) if c.is_ascii_digit() || c == ':' || c == '/')
}

fn convert_marks_once(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut changed = false;
    let mut out = String::with_capacity(text.len());
    for (idx, &ch) in chars.iter().enumerate() {
        let prev = idx.checked_sub(1).map(|i| chars[i]);
        let next = chars.get(idx + 1).copied();
        match full_width(ch) {
            Some(wide) if !protects(prev) && !protects(next) => {
                out.push(wide);
                changed = true;
            }
            _ => out.push(ch),
        }
    }
    changed.then_some(out)
}

fn collapse_repeated_marks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for ch in text.chars() {
        if prev == Some(ch) && matches!(ch, '。' | '，' | '！' | '？') {
            continue;
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

/// Converts ASCII marks to full width outside numeric or URL-like context, then
/// collapses runs of the same terminal mark. Applying it twice changes nothing.
pub fn normalize_punctuation(text: &str) -> String {
    let mut current = text.to_string();
    // A converted ':' can unprotect its neighbours, so run until stable.
    while let Some(next) = convert_marks_once(&current) {
        current = next;
    }
    collapse_repeated_marks(&current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::default()
    }

    #[test]
    fn title_drops_exclamations() {
        assert_eq!(
            normalizer().process_title("某地烟草工作推进顺利！", "news_general"),
            "某地烟草工作推进顺利"
        );
    }

    #[test]
    fn data_led_title_moves_figure_first() {
        let title = normalizer().process_title("山东省烟草销售45.2万箱！", "economic_data");
        assert_eq!(title, "45.2万箱：山东省烟草销售");
    }

    #[test]
    fn data_led_title_skips_dates() {
        assert_eq!(
            normalizer().lead_with_figure("2024年全省卷烟销售45.2万箱"),
            "45.2万箱：2024年全省卷烟销售"
        );
        let title = normalizer().process_title("2024年工作会议召开", "economic_data");
        assert_eq!(title, "2024年工作会议召开");
    }

    #[test]
    fn data_led_title_without_figure_is_untouched() {
        let title = normalizer().process_title("某地烟草工作推进顺利", "economic_data");
        assert_eq!(title, "某地烟草工作推进顺利");
    }

    #[test]
    fn long_title_is_truncated() {
        let title = normalizer().process_title("一二三四五六七八九十一二三四五六七", "news_general");
        assert_eq!(title, "一二三四五六七八九十一二三四五...");
    }

    #[test]
    fn lead_prefers_sentence_boundary() {
        let normalizer = TextNormalizer::new(NormalizerConfig {
            lead_min_chars: 2,
            lead_max_chars: 10,
            ..NormalizerConfig::default()
        });
        assert_eq!(normalizer.process_lead("一二三四五六七八。九十十一"), "一二三四五六七八。");
        assert_eq!(normalizer.process_lead("一二。三四五六七八九十十一"), "一二。三四五六...");
    }

    #[test]
    fn lead_collapses_whitespace() {
        let normalizer = TextNormalizer::new(NormalizerConfig {
            lead_min_chars: 1,
            ..NormalizerConfig::default()
        });
        assert_eq!(normalizer.process_lead("  今年以来，\n\t全省  推进 "), "今年以来， 全省 推进");
    }

    #[test]
    fn body_rejoins_paragraphs() {
        let body = "第一段。。\n\n\n  第二段,继续!\n\n";
        assert_eq!(normalizer().process_body(body), "第一段。\n\n第二段，继续！");
    }

    #[test]
    fn punctuation_spares_numbers_and_urls() {
        assert_eq!(normalize_punctuation("共3,000元"), "共3,000元");
        assert_eq!(normalize_punctuation("见http://a.cn/x"), "见http://a.cn/x");
        assert_eq!(normalize_punctuation("地点北京,时间10:30"), "地点北京，时间10:30");
        assert_eq!(normalize_punctuation("真的吗??"), "真的吗？");
    }

    #[test]
    fn punctuation_is_idempotent_on_mixed_marks() {
        let once = normalize_punctuation("a:,b!!");
        assert_eq!(normalize_punctuation(&once), once);
    }
}
