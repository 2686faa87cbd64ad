use proptest::prelude::*;
use restyle_core::{
    normalize_punctuation, EntityGuard, EntityKind, LengthRange, QualityScorer,
};

const FRAGMENTS: &[&str] = &[
    "2024年", "10月", "15日", "3月8日", "1.2万元", "8.5%", "3,000元", "45", "12项", "，", "。",
    "某局", "投入", "完成改造", "同比增长", "山东省烟草公司", "国家烟草专卖局", "中国烟草总公司",
    "青岛市烟草专卖局", "烟草", "A1", "市场", " ",
];

fn article_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(FRAGMENTS), 0..24).prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn encode_then_decode_restores_text(text in article_text()) {
        let guard = EntityGuard::default();
        let entities = guard.extract(&text);
        let (encoded, mapping) = guard.encode(&text, &entities);
        let decoded = guard.decode_with_report(&encoded, &mapping);
        prop_assert_eq!(&decoded.text, &text);
        prop_assert!(!decoded.leak.has_leak);
        prop_assert!(decoded.unused_keys.is_empty(), "unused {:?}", decoded.unused_keys);
        prop_assert!(!guard.detect_leak(&decoded.text).has_leak);
        for (key, _) in mapping.iter() {
            let token = format!("{{{{{key}}}}}");
            prop_assert!(encoded.contains(&token), "{} missing from {}", token, encoded);
        }
    }

    #[test]
    fn entities_never_share_a_span(prefix in prop::sample::select(&["2024年", "3月8日", "45", "A1", "1.2万元"][..])) {
        let text = format!("{prefix}山东省烟草公司发布通知");
        let entities = EntityGuard::default().extract(&text);
        let orgs: Vec<_> = entities
            .iter()
            .filter(|e| e.kind == EntityKind::Organization)
            .map(|e| e.value.as_str())
            .collect();
        prop_assert_eq!(orgs, vec!["山东省烟草公司"]);
        prop_assert!(entities.iter().all(|e| !e.value.contains("烟草") || e.kind == EntityKind::Organization));
    }

    #[test]
    fn placeholders_in_encoded_text_are_all_mapped(text in article_text()) {
        let guard = EntityGuard::default();
        let entities = guard.extract(&text);
        let (encoded, mapping) = guard.encode(&text, &entities);
        let report = guard.detect_leak(&encoded);
        for key in &report.leaked_keys {
            prop_assert!(mapping.get(key).is_some(), "unmapped placeholder {}", key);
        }
        let mut keys = report.leaked_keys.clone();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), report.leaked_keys.len());
    }

    #[test]
    fn calendar_spans_are_dates(y in 1990u32..2100, m in 1u32..13, d in 1u32..29) {
        let text = format!("{y}年{m}月{d}日，完成改造");
        let entities = EntityGuard::default().extract(&text);
        let dates: Vec<_> = entities.iter().filter(|e| e.kind == EntityKind::Date).collect();
        prop_assert_eq!(dates.len(), 1);
        prop_assert_eq!(&dates[0].value, &format!("{y}年{m}月{d}日"));
        prop_assert!(entities.iter().all(|e| e.kind != EntityKind::Number));
    }

    #[test]
    fn punctuation_normalization_is_idempotent(text in "[a-z0-9,;:!?/。，！？ 年月]{0,40}") {
        let once = normalize_punctuation(&text);
        prop_assert_eq!(normalize_punctuation(&once), once);
    }

    #[test]
    fn length_score_drops_two_points_per_char(len in 0usize..80) {
        let scorer = QualityScorer::default();
        let range = LengthRange::new(15, 30);
        let score = scorer.length_score(len, range);
        let expected = if (15..=30).contains(&len) {
            1.0
        } else {
            let deviation = if len < 15 { 15 - len } else { len - 30 };
            f64::max(0.7, 1.0 - 0.02 * deviation as f64)
        };
        prop_assert!((score - expected).abs() < 1e-9);
    }
}
