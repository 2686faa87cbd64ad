//! Entity locking, output normalization and rule-based quality scoring for
//! rewritten news articles.

mod article;
mod config;
mod error;
mod guard;
mod normalizer;
mod patterns;
mod quality;

pub use article::{parse_generation_output, split_paragraphs, Article, ParsedOutput};
pub use config::RestyleConfig;
pub use error::{RestyleError, Result};
pub use guard::{
    Decoded, EntityGuard, EntityKind, EntityVerification, ExtractedEntity, GuardConfig,
    LeakReport, LockedEntities, NumberCheck, PlaceholderMap, StrictNumberReport,
};
pub use normalizer::{normalize_punctuation, smart_truncate, NormalizerConfig, TextNormalizer};
pub use patterns::{compile, DEFAULT_ORG_PATTERN, DEFAULT_QUALITY_ORG_PATTERN};
pub use quality::{
    ConsistencyDetail, CueGroup, LengthRange, QualityConfig, QualityReport, QualityScorer,
    StructureDetail, StyleDetail,
};
