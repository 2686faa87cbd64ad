use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::error::{RestyleError, Result};

/// Calendar expressions, longest form first so a full date never splits.
pub(crate) static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}年\d{1,2}月\d{1,2}日|\d{1,2}月\d{1,2}日|\d{4}年\d{1,2}月|\d{4}年")
        .expect("valid regex")
});

/// Integers and decimals with an optional unit; thousands-separated figures are one span.
pub(crate) static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?(?:[万亿千百]?元|%|万|亿|千|百|个|项|条|人|次)?",
    )
    .expect("valid regex")
});

/// Unit-bearing figures compared by strict-mode validation.
pub(crate) static UNIT_FIGURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:\.\d+)?[万亿千]?(?:箱|元|吨|%)").expect("valid regex")
});

/// Number-with-unit span moved to the front of data-led titles.
pub(crate) static TITLE_FIGURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:\.\d+)?[万亿千百]?[箱元件人%]?").expect("valid regex")
});

pub(crate) static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Z_0-9]+)\}\}").expect("valid regex"));

pub const DEFAULT_ORG_PATTERN: &str =
    r"[\x{4e00}-\x{9fa5}A-Za-z0-9]{2,20}(?:烟草(?:专卖)?局|烟草公司|烟草总公司)";

pub const DEFAULT_QUALITY_ORG_PATTERN: &str =
    r"[\x{4e00}-\x{9fa5}]{2,10}(?:公司|企业|集团|局|厅|部|工厂|中心|专卖局)";

pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| RestyleError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Compiles every fragment, skipping the ones that fail. Falls back to `default`
/// when nothing usable remains.
pub(crate) fn compile_or_default(fragments: &[String], default: &str, what: &str) -> Vec<Regex> {
    let mut compiled = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        match compile(fragment) {
            Ok(re) => compiled.push(re),
            Err(err) => warn!(kind = what, "skipping pattern: {err}"),
        }
    }
    if compiled.is_empty() {
        if !fragments.is_empty() {
            warn!(kind = what, "no usable patterns configured, using built-in default");
        }
        compiled.push(Regex::new(default).expect("valid default regex"));
    }
    compiled
}

pub(crate) fn compile_all(fragments: &[String], what: &str) -> Vec<Regex> {
    fragments
        .iter()
        .filter_map(|fragment| match compile(fragment) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(kind = what, "skipping pattern: {err}");
                None
            }
        })
        .collect()
}

pub(crate) fn placeholder(key: &str) -> String {
    format!("{{{{{key}}}}}")
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}
