use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// One exemplar article available for few-shot retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SampleDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lead: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SampleDocument {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        lead: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            lead: lead.into(),
            body: body.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Text indexed for retrieval.
    pub fn indexed_text(&self) -> String {
        format!("{} {} {}", self.title, self.lead, self.body)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawSample {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    lead: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    features: Option<RawFeatures>,
}

#[derive(Debug, Deserialize, Default)]
struct RawFeatures {
    #[serde(default)]
    column_indicators: IndexMap<String, bool>,
}

impl RawSample {
    fn into_document(self, idx: usize) -> SampleDocument {
        let id = match self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::Null) | None => format!("sample_{idx:03}"),
            Some(Value::String(_)) => format!("sample_{idx:03}"),
            Some(other) => other.to_string(),
        };
        let mut tags = self.tags;
        if let Some(kind) = self.kind.filter(|k| !k.is_empty()) {
            tags.push(kind);
        }
        if let Some(features) = self.features {
            tags.extend(
                features
                    .column_indicators
                    .into_iter()
                    .filter(|(_, on)| *on)
                    .map(|(column, _)| column),
            );
        }
        let mut seen = std::collections::HashSet::new();
        tags.retain(|t| seen.insert(t.clone()));
        SampleDocument {
            id,
            title: self.title,
            lead: self.lead,
            body: self.body,
            tags,
        }
    }
}

/// Loads exemplars from a JSON array, an `{"articles": [...]}` object or JSONL.
pub fn load_corpus(path: &Path) -> Result<Vec<SampleDocument>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus {}", path.display()))?;
    let docs = parse_corpus(&contents)
        .with_context(|| format!("invalid corpus {}", path.display()))?;
    if docs.is_empty() {
        warn!(path = %path.display(), "corpus is empty");
    } else {
        info!(path = %path.display(), documents = docs.len(), "loaded corpus");
    }
    Ok(docs)
}

pub fn parse_corpus(contents: &str) -> Result<Vec<SampleDocument>> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawSample> = match serde_json::from_str::<Value>(contents) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(serde_json::from_value::<RawSample>)
            .collect::<std::result::Result<_, _>>()?,
        Ok(Value::Object(mut map)) => match map.remove("articles") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(serde_json::from_value::<RawSample>)
                .collect::<std::result::Result<_, _>>()?,
            Some(_) => return Err(anyhow!("\"articles\" must be an array")),
            None => vec![serde_json::from_value(Value::Object(map))?],
        },
        Ok(_) => return Err(anyhow!("corpus must be an array or object")),
        Err(_) => parse_jsonl(contents)?,
    };
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(idx, sample)| sample.into_document(idx))
        .collect())
}

fn parse_jsonl(contents: &str) -> Result<Vec<RawSample>> {
    let mut out = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sample = serde_json::from_str(trimmed)
            .with_context(|| format!("line {}: invalid record", line_no + 1))?;
        out.push(sample);
    }
    Ok(out)
}

pub struct JsonlWriter<W> {
    writer: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(record)?;
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
