use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    /// Added inside the IDF logarithm; fixed for the lifetime of an index.
    pub idf_addend: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            idf_addend: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DocTerms {
    tf: FxHashMap<String, u32>,
    len: usize,
}

/// Term statistics for a growing corpus. IDF is refreshed on every insert.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    docs: Vec<DocTerms>,
    df: FxHashMap<String, usize>,
    idf: FxHashMap<String, f64>,
    total_len: usize,
}

impl Bm25Index {
    fn new(params: Bm25Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn build<I>(params: Bm25Params, documents: I) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut index = Self::new(params);
        for tokens in documents {
            index.insert(tokens);
        }
        index.refresh_idf();
        index
    }

    pub fn push_document(&mut self, tokens: Vec<String>) {
        self.insert(tokens);
        self.refresh_idf();
    }

    fn insert(&mut self, tokens: Vec<String>) {
        let mut doc = DocTerms {
            len: tokens.len(),
            ..DocTerms::default()
        };
        for token in tokens {
            *doc.tf.entry(token).or_insert(0) += 1;
        }
        for term in doc.tf.keys() {
            *self.df.entry(term.clone()).or_insert(0) += 1;
        }
        self.total_len += doc.len;
        self.docs.push(doc);
    }

    fn refresh_idf(&mut self) {
        let n = self.docs.len() as f64;
        let addend = self.params.idf_addend;
        self.idf = self
            .df
            .iter()
            .map(|(term, df)| {
                let df = *df as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + addend).ln().max(0.0);
                (term.clone(), idf)
            })
            .collect();
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn vocabulary(&self) -> usize {
        self.df.len()
    }

    pub fn avg_len(&self) -> f64 {
        if self.docs.is_empty() {
            return 0.0;
        }
        self.total_len as f64 / self.docs.len() as f64
    }

    pub fn idf(&self, term: &str) -> f64 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    /// Okapi BM25 of `doc` against the query terms. Unknown terms add nothing.
    pub fn score(&self, query: &[String], doc: usize) -> f64 {
        let Some(terms) = self.docs.get(doc) else {
            return 0.0;
        };
        if terms.len == 0 {
            return 0.0;
        }
        let Bm25Params { k1, b, .. } = self.params;
        let avg_len = self.avg_len().max(1e-6);
        let norm = k1 * (1.0 - b + b * (terms.len as f64 / avg_len));
        let mut score = 0.0;
        for term in query {
            let Some(&tf) = terms.tf.get(term) else {
                continue;
            };
            let tf = tf as f64;
            score += self.idf(term) * (tf * (k1 + 1.0)) / (tf + norm);
        }
        score
    }
}
