use std::io::Write;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use restyle_index::{
    load_corpus, title_similarity, Bm25Index, Bm25Params, LexicalRetriever, RetrieverConfig,
    SampleDocument, TokenizerMode,
};

const TITLE_CHARS: &[char] = &['烟', '草', '数', '字', '化', '转', '型', '销', '售', '市', '场', '零'];

fn title() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(TITLE_CHARS), 1..8)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn more_query_terms_never_score_lower(
        query_len in 1usize..6,
        shared in 0usize..6,
        filler in 0usize..5,
    ) {
        let query: Vec<String> = (0..query_len).map(|i| format!("q{i}")).collect();
        let shared = shared.min(query_len);
        let len = query_len + filler;

        let mut richer = query.clone();
        richer.extend((0..len - query_len).map(|i| format!("f{i}")));
        let mut poorer: Vec<String> = query[..shared].to_vec();
        poorer.extend((0..len - shared).map(|i| format!("g{i}")));
        prop_assert_eq!(richer.len(), poorer.len());

        let index = Bm25Index::build(
            Bm25Params::default(),
            vec![richer, poorer, vec!["z".to_string()]],
        );
        prop_assert!(index.score(&query, 0) >= index.score(&query, 1));
    }

    #[test]
    fn returned_titles_stay_diverse(titles in prop::collection::vec(title(), 1..12), k in 1usize..6) {
        let docs: Vec<SampleDocument> = titles
            .iter()
            .enumerate()
            .map(|(i, t)| SampleDocument::new(format!("d{i}"), t.clone(), "", "烟草市场"))
            .collect();
        let config = RetrieverConfig::default();
        let threshold = config.diversity_threshold;
        let retriever = LexicalRetriever::build(docs, config);
        // No query term matches, so ranking keeps corpus order.
        let hits = retriever.retrieve("无关查询", k, None);
        prop_assert_eq!(hits.len(), k.min(titles.len()));

        let overlapping = hits.iter().enumerate().any(|(i, a)| {
            hits[i + 1..]
                .iter()
                .any(|b| title_similarity(&a.document.title, &b.document.title) > threshold)
        });
        if overlapping {
            // Only allowed when greedy selection could not find k distinct titles.
            let mut distinct: Vec<&str> = Vec::new();
            for t in &titles {
                if distinct.iter().all(|d| title_similarity(d, t) <= threshold) {
                    distinct.push(t);
                }
            }
            prop_assert!(distinct.len() < k, "distinct={}, k={}", distinct.len(), k);
        }
    }
}

#[test]
fn words_mode_ranks_by_whole_runs() {
    let docs = vec![
        SampleDocument::new("a", "数字化转型", "", "推进数字化转型"),
        SampleDocument::new("b", "转型升级", "", "数字 转型"),
    ];
    let config = RetrieverConfig {
        tokenizer: TokenizerMode::Words,
        ..RetrieverConfig::default()
    };
    let retriever = LexicalRetriever::build(docs, config);
    let hits = retriever.retrieve("数字化转型", 2, None);
    assert_eq!(hits[0].document.id, "a");
    assert_eq!(hits[1].score, 0.0);
}

#[test]
fn concurrent_queries_and_inserts() {
    let docs: Vec<SampleDocument> = (0..20)
        .map(|i| SampleDocument::new(format!("d{i}"), format!("标题{i}"), "导语", "烟草市场"))
        .collect();
    let retriever = Arc::new(LexicalRetriever::build(docs, RetrieverConfig::default()));
    let mut handles = Vec::new();
    for worker in 0..4 {
        let retriever = Arc::clone(&retriever);
        handles.push(thread::spawn(move || {
            for round in 0..25 {
                if worker == 0 && round % 5 == 0 {
                    retriever.add_document(SampleDocument::new(
                        format!("n{round}"),
                        format!("新增{round}"),
                        "",
                        "市场",
                    ));
                }
                let hits = retriever.retrieve("烟草市场", 3, None);
                assert_eq!(hits.len(), 3);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(retriever.len(), 25);
}

#[test]
fn corpus_file_feeds_retriever() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"articles": [
            {{"id": "x1", "title": "卷烟销售增长", "body": "销售同比增长", "type": "economic_data"}},
            {{"id": "x2", "title": "专卖执法", "body": "市场检查"}}
        ]}}"#
    )
    .unwrap();
    let docs = load_corpus(file.path()).unwrap();
    let retriever = LexicalRetriever::build(docs, RetrieverConfig::default());
    let hits = retriever.retrieve_top("销售增长", Some("economic_data"));
    assert_eq!(hits[0].document.id, "x1");
    assert_eq!(retriever.stats().tag_distribution.get("economic_data"), Some(&1));
}
