mod bm25;
mod cache;
mod corpus;
mod retriever;
mod tokenize;

pub use bm25::{Bm25Index, Bm25Params};
pub use corpus::{load_corpus, parse_corpus, JsonlWriter, SampleDocument};
pub use retriever::{
    title_similarity, LexicalRetriever, RetrieverConfig, RetrieverStats, ScoredCandidate,
};
pub use tokenize::TokenizerMode;
