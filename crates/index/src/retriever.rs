use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bm25::{Bm25Index, Bm25Params};
use crate::cache::{CacheKey, QueryCache};
use crate::corpus::SampleDocument;
use crate::tokenize::TokenizerMode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    pub k1: f64,
    pub b: f64,
    pub idf_addend: f64,
    pub tokenizer: TokenizerMode,
    pub top_k: usize,
    /// Titles whose character-set Jaccard overlap exceeds this count as duplicates.
    pub diversity_threshold: f64,
    pub cache_capacity: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        let params = Bm25Params::default();
        Self {
            k1: params.k1,
            b: params.b,
            idf_addend: params.idf_addend,
            tokenizer: TokenizerMode::default(),
            top_k: 3,
            diversity_threshold: 0.7,
            cache_capacity: 100,
        }
    }
}

impl RetrieverConfig {
    fn params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.k1,
            b: self.b,
            idf_addend: self.idf_addend,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub document: SampleDocument,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieverStats {
    pub documents: usize,
    pub vocabulary: usize,
    pub avg_doc_len: f64,
    pub tag_distribution: BTreeMap<String, usize>,
}

struct IndexState {
    corpus: Vec<SampleDocument>,
    index: Bm25Index,
}

/// BM25 ranking over an in-memory exemplar corpus.
///
/// Queries share a read lock on the index; `add_document` takes the write lock
/// and clears the result cache before releasing it. Locks are always taken in
/// index-then-cache order.
pub struct LexicalRetriever {
    config: RetrieverConfig,
    state: RwLock<IndexState>,
    cache: Mutex<QueryCache>,
}

impl LexicalRetriever {
    pub fn build(corpus: Vec<SampleDocument>, config: RetrieverConfig) -> Self {
        if corpus.is_empty() {
            warn!("building retriever over an empty corpus");
        }
        let tokenizer = config.tokenizer;
        let index = Bm25Index::build(
            config.params(),
            corpus.iter().map(|doc| tokenizer.tokenize(&doc.indexed_text())),
        );
        info!(
            documents = index.len(),
            vocabulary = index.vocabulary(),
            avg_len = index.avg_len(),
            "built lexical index"
        );
        let cache = Mutex::new(QueryCache::new(config.cache_capacity));
        Self {
            config,
            state: RwLock::new(IndexState { corpus, index }),
            cache,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.state.read().corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<SampleDocument> {
        self.state.read().corpus.iter().find(|d| d.id == id).cloned()
    }

    /// Top `config.top_k` candidates for `query`.
    pub fn retrieve_top(&self, query: &str, filter: Option<&str>) -> Vec<ScoredCandidate> {
        self.retrieve(query, self.config.top_k, filter)
    }

    /// Ranks the corpus against `query` and returns at most `k` candidates.
    ///
    /// Documents tagged with `filter` are preferred. Near-duplicate titles are
    /// skipped while enough distinct candidates remain; when they run out the
    /// result is backfilled in score order.
    pub fn retrieve(&self, query: &str, k: usize, filter: Option<&str>) -> Vec<ScoredCandidate> {
        if k == 0 {
            return Vec::new();
        }
        let state = self.state.read();
        if state.index.is_empty() {
            warn!("corpus is empty, no exemplars retrieved");
            return Vec::new();
        }
        let key = CacheKey {
            query: query.to_string(),
            k,
            filter: filter.map(str::to_string),
        };
        if let Some(hits) = self.cache.lock().get(&key) {
            debug!(query_chars = query.chars().count(), "retrieval cache hit");
            return hits;
        }

        let terms = self.config.tokenizer.tokenize(query);
        let mut ranked: Vec<(usize, f64)> = (0..state.corpus.len())
            .map(|idx| (idx, state.index.score(&terms, idx)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let selected = self.select(&state.corpus, &ranked, k, filter);
        let hits: Vec<ScoredCandidate> = selected
            .into_iter()
            .map(|(idx, score)| ScoredCandidate {
                document: state.corpus[idx].clone(),
                score,
            })
            .collect();
        info!(
            terms = terms.len(),
            returned = hits.len(),
            filter = filter.unwrap_or("-"),
            "retrieved exemplars"
        );
        self.cache.lock().insert(key, hits.clone());
        hits
    }

    fn select(
        &self,
        corpus: &[SampleDocument],
        ranked: &[(usize, f64)],
        k: usize,
        filter: Option<&str>,
    ) -> Vec<(usize, f64)> {
        let threshold = self.config.diversity_threshold;
        let mut chosen: Vec<(usize, f64)> = Vec::with_capacity(k);
        let mut taken: HashSet<usize> = HashSet::new();
        let matches = |idx: usize| filter.map_or(true, |tag| corpus[idx].has_tag(tag));

        // Filter matches first, then everything else, both under the diversity rule.
        for want_match in [true, false] {
            for &(idx, score) in ranked {
                if chosen.len() >= k {
                    return chosen;
                }
                if taken.contains(&idx) || matches(idx) != want_match {
                    continue;
                }
                let title = &corpus[idx].title;
                let duplicate = chosen
                    .iter()
                    .any(|(other, _)| title_similarity(title, &corpus[*other].title) > threshold);
                if duplicate {
                    debug!(id = %corpus[idx].id, "skipping near-duplicate title");
                    continue;
                }
                taken.insert(idx);
                chosen.push((idx, score));
            }
        }

        for &(idx, score) in ranked {
            if chosen.len() >= k {
                break;
            }
            if taken.insert(idx) {
                chosen.push((idx, score));
            }
        }
        chosen
    }

    /// Appends a document. IDF is refreshed immediately and cached results are dropped.
    pub fn add_document(&self, document: SampleDocument) {
        let mut state = self.state.write();
        if state.corpus.iter().any(|d| d.id == document.id) {
            warn!(id = %document.id, "adding document with duplicate id");
        }
        let tokens = self.config.tokenizer.tokenize(&document.indexed_text());
        state.index.push_document(tokens);
        info!(id = %document.id, documents = state.index.len(), "added document");
        state.corpus.push(document);
        self.cache.lock().invalidate();
    }

    pub fn stats(&self) -> RetrieverStats {
        let state = self.state.read();
        let mut tag_distribution = BTreeMap::new();
        for doc in &state.corpus {
            for tag in &doc.tags {
                *tag_distribution.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        RetrieverStats {
            documents: state.corpus.len(),
            vocabulary: state.index.vocabulary(),
            avg_doc_len: state.index.avg_len(),
            tag_distribution,
        }
    }

    #[cfg(test)]
    fn cached_queries(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Jaccard overlap of the two titles' character sets. Empty titles never overlap.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let b: HashSet<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();
    shared as f64 / union as f64
}
