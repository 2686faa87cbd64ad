use serde::Serialize;
use tracing::{debug, info};

use restyle_core::{
    parse_generation_output, Article, EntityGuard, EntityVerification, QualityReport,
    QualityScorer, RestyleConfig, StrictNumberReport, TextNormalizer,
};
use restyle_index::LexicalRetriever;
use restyle_llm::{GenerationError, Generator, RetryPolicy};

use crate::prompt::build_rewrite_prompt;

/// Sampling settings forwarded with every generation request.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExemplarRef {
    pub id: String,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteReport {
    pub category: String,
    pub article: Article,
    pub style_note: Option<String>,
    pub parse_fallback: bool,
    pub exemplars: Vec<ExemplarRef>,
    pub placeholders: usize,
    pub unused_placeholders: Vec<String>,
    pub verification: EntityVerification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<StrictNumberReport>,
    pub quality: QualityReport,
    /// Entity checks passed, and the strict figure check too when requested.
    pub accepted: bool,
    pub total_tokens: u32,
}

/// Encode, retrieve, generate, decode, verify, normalize and score one article.
pub struct RewriteEngine {
    guard: EntityGuard,
    retriever: LexicalRetriever,
    normalizer: TextNormalizer,
    scorer: QualityScorer,
    retry: RetryPolicy,
    sampling: Sampling,
}

impl RewriteEngine {
    pub fn new(
        config: &RestyleConfig,
        retriever: LexicalRetriever,
        retry: RetryPolicy,
        sampling: Sampling,
    ) -> Self {
        Self {
            guard: EntityGuard::new(&config.guard),
            retriever,
            normalizer: TextNormalizer::new(config.normalizer.clone()),
            scorer: QualityScorer::new(config.quality.clone()),
            retry,
            sampling,
        }
    }

    pub async fn rewrite<G>(
        &self,
        generator: &G,
        original: &str,
        category: &str,
        strict: bool,
    ) -> Result<RewriteReport, GenerationError>
    where
        G: Generator + ?Sized,
    {
        let entities = self.guard.extract(original);
        let (encoded, mapping) = self.guard.encode(original, &entities);

        let exemplars = self.retriever.retrieve_top(original, Some(category));
        if exemplars.is_empty() {
            debug!(category, "prompting without exemplars");
        }

        let mut request = build_rewrite_prompt(&encoded, category, &exemplars, strict);
        request.temperature = Some(self.sampling.temperature);
        request.max_tokens = Some(self.sampling.max_tokens);
        let response = self.retry.run(generator, &request).await?;

        let decoded = self.guard.decode_with_report(&response.content, &mapping);
        let parsed = parse_generation_output(&decoded.text);
        let rewritten = parsed.article.full_text();
        let verification = self.guard.verify(original, &rewritten, &mapping);
        let strict_report = strict.then(|| self.guard.strict_number_check(original, &rewritten));

        let article = self.normalizer.process(&parsed.article, category);
        let quality = self.scorer.check(&article, original, Some(category));
        let accepted = verification.is_valid
            && strict_report.as_ref().map_or(true, |report| report.is_valid);
        info!(
            category,
            placeholders = mapping.len(),
            exemplars = exemplars.len(),
            accepted,
            overall = quality.overall,
            "rewrite finished"
        );

        Ok(RewriteReport {
            category: category.to_string(),
            article,
            style_note: parsed.style_note,
            parse_fallback: parsed.parse_fallback,
            exemplars: exemplars
                .iter()
                .map(|c| ExemplarRef {
                    id: c.document.id.clone(),
                    title: c.document.title.clone(),
                    score: c.score,
                })
                .collect(),
            placeholders: mapping.len(),
            unused_placeholders: decoded.unused_keys,
            verification,
            strict: strict_report,
            quality,
            accepted,
            total_tokens: response.total_tokens(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::future::{self, BoxFuture, FutureExt};
    use restyle_index::{RetrieverConfig, SampleDocument};
    use restyle_llm::{LlmClient, LlmProvider, LlmRequest, LlmResponse};

    use super::*;

    const ORIGINAL: &str = "2024年10月15日，某局投入1.2万元完成改造，同比增长8.5%。";

    struct Canned {
        reply: String,
        seen: Mutex<Vec<String>>,
    }

    impl Generator for Canned {
        fn generate<'a>(
            &'a self,
            req: &'a LlmRequest,
        ) -> BoxFuture<'a, Result<LlmResponse, GenerationError>> {
            self.seen.lock().unwrap().push(req.user.clone());
            future::ready(Ok(LlmResponse {
                content: self.reply.clone(),
                prompt_tokens: 10,
                completion_tokens: 5,
            }))
            .boxed()
        }
    }

    struct Refusing;

    impl Generator for Refusing {
        fn generate<'a>(
            &'a self,
            _req: &'a LlmRequest,
        ) -> BoxFuture<'a, Result<LlmResponse, GenerationError>> {
            future::ready(Err(GenerationError::from_status(401, "bad key".into(), None))).boxed()
        }
    }

    fn engine() -> RewriteEngine {
        let corpus = vec![
            SampleDocument::new("e1", "45.2万箱：某地卷烟销售创新高", "", "卷烟销售同比增长")
                .with_tags(["economic_data"]),
            SampleDocument::new("n1", "某局召开工作会议", "", "部署全年工作"),
        ];
        RewriteEngine::new(
            &RestyleConfig::default(),
            LexicalRetriever::build(corpus, RetrieverConfig::default()),
            RetryPolicy {
                base_delay_ms: 0,
                max_jitter_ms: 0,
                ..RetryPolicy::default()
            },
            Sampling {
                temperature: 0.3,
                max_tokens: 2000,
            },
        )
    }

    #[tokio::test]
    async fn placeholders_survive_generation() {
        let generator = Canned {
            reply: "===标题===\n某局改造投入{{NUM_1}}！\n===导语===\n{{DATE_1}}，某局完成改造工作,同比增长{{NUM_2}}。\n===正文===\n近年来，某局推进改造。\n\n实施后取得成效。\n===风格说明===\n数据前置\n".to_string(),
            seen: Mutex::new(Vec::new()),
        };
        let report = engine()
            .rewrite(&generator, ORIGINAL, "economic_data", true)
            .await
            .unwrap();

        let prompt = generator.seen.lock().unwrap()[0].clone();
        assert!(prompt.contains("{{DATE_1}}，某局投入{{NUM_1}}"));
        assert!(!prompt.contains("2024年10月15日"));

        assert!(report.verification.is_valid, "{:?}", report.verification);
        assert_eq!(report.article.title, "1.2万元：某局改造投入");
        assert_eq!(report.style_note.as_deref(), Some("数据前置"));
        assert_eq!(report.exemplars[0].id, "e1");
        assert_eq!(report.placeholders, 3);
        assert!(report.strict.as_ref().is_some_and(|s| s.is_valid));
        assert!(report.accepted);
        assert_eq!(report.total_tokens, 15);
    }

    #[tokio::test]
    async fn invented_numbers_reject_the_rewrite() {
        let generator = Canned {
            reply: "===标题===\n某局改造\n===导语===\n{{DATE_1}}，某局投入{{NUM_1}}，增长{{NUM_2}}，节约30万元。\n===正文===\n改造完成。\n".to_string(),
            seen: Mutex::new(Vec::new()),
        };
        let report = engine()
            .rewrite(&generator, ORIGINAL, "news_general", false)
            .await
            .unwrap();
        assert!(!report.accepted);
        assert!(report.verification.new_numbers.contains(&"30万元".to_string()));
        assert!(report.strict.is_none());
    }

    #[tokio::test]
    async fn permanent_failures_propagate() {
        let err = engine()
            .rewrite(&Refusing, ORIGINAL, "news_general", false)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn local_provider_runs_offline() {
        let client = LlmClient::new(LlmProvider::Local, "local", Duration::from_secs(5)).unwrap();
        let report = engine()
            .rewrite(&client, ORIGINAL, "news_general", true)
            .await
            .unwrap();
        assert!(!report.parse_fallback);
        assert!(report.verification.is_valid, "{:?}", report.verification);
        assert!(report.article.body.contains("2024年10月15日"));
        assert!(report.accepted);
    }
}
