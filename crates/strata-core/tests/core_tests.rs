#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};
    use std::time::Duration;
    use strata_core::*;

    // ── Record tests ───────────────────────────────────────────

    mod records {
        use super::*;

        #[test]
        fn test_new_fills_id_timestamp_importance() {
            let before = strata_core::clock::now_secs();
            let r = Record::new("hello");
            assert!(!r.id.is_empty());
            assert!(r.timestamp >= before);
            assert_eq!(r.importance(), strata_core::record::DEFAULT_IMPORTANCE);
            assert!(r.tags.is_empty());
            assert!(r.embedding.is_none());
            assert!(r.relations.is_empty());
        }

        #[test]
        fn test_ids_are_unique() {
            let a = Record::new("x");
            let b = Record::new("x");
            assert_ne!(a.id, b.id);
        }

        #[test]
        fn test_with_timestamp_ignores_non_finite() {
            let r = Record::new("x").with_timestamp(1_700_000_000.0);
            assert_eq!(r.clone().with_timestamp(f64::NAN).timestamp, 1_700_000_000.0);
            assert_eq!(r.clone().with_timestamp(f64::INFINITY).timestamp, 1_700_000_000.0);
            assert_eq!(r.with_timestamp(f64::NEG_INFINITY).timestamp, 1_700_000_000.0);

            let fresh = Record::new("y").with_timestamp(f64::NAN);
            assert!(fresh.timestamp.is_finite());
            assert!(Record::from_map(fresh.to_map()).is_ok());
        }

        #[test]
        fn test_importance_is_clamped() {
            assert_eq!(Record::new("a").with_importance(1.7).importance(), 1.0);
            assert_eq!(Record::new("a").with_importance(-0.2).importance(), 0.0);
            assert_eq!(Record::new("a").with_importance(0.3).importance(), 0.3);
            assert_eq!(
                Record::new("a").with_importance(f64::NAN).importance(),
                strata_core::record::DEFAULT_IMPORTANCE
            );
        }

        #[test]
        fn test_text_renders_strings_verbatim() {
            assert_eq!(Record::new("rent expense").text(), "rent expense");
            let r = Record::new(json!({"amount": 12}));
            assert_eq!(r.text(), r#"{"amount":12}"#);
            assert_eq!(r.content_type(), "object");
        }

        #[test]
        fn test_map_roundtrip_is_lossless() {
            let mut prefs = Map::new();
            prefs.insert("tone".into(), json!("formal"));
            let original = Record::new(json!({"text": "quarterly report", "pages": 4}))
                .with_id("rec-1")
                .with_source("ledger")
                .with_timestamp(1_700_000_000.25)
                .with_importance(0.8)
                .with_tags(["finance", "report"])
                .with_metadata("author", "kim")
                .with_embedding(vec![0.1, 0.2, 0.3])
                .with_kind(MemoryKind::Episodic)
                .with_episode("ep-1")
                .with_related(["rec-0"])
                .with_previous("rec-0")
                .with_shared_context("team")
                .with_model_preferences("model-a", prefs)
                .with_ttl(Ttl::secs(60));

            let restored = Record::from_map(original.to_map()).unwrap();
            assert_eq!(restored, original);
        }

        #[test]
        fn test_roundtrip_preserves_never_ttl() {
            let original = Record::new("x").with_ttl(Ttl::Never);
            let restored = Record::from_map(original.to_map()).unwrap();
            assert_eq!(restored.relations.ttl, Some(Ttl::Never));
        }

        #[test]
        fn test_from_map_fills_defaults() {
            let mut map = Map::new();
            map.insert("content".into(), json!("bare"));
            let r = Record::from_map(map).unwrap();
            assert!(!r.id.is_empty());
            assert!(r.timestamp > 0.0);
            assert_eq!(r.importance(), 0.5);
        }

        #[test]
        fn test_from_map_clamps_importance() {
            let mut map = Map::new();
            map.insert("content".into(), json!("loud"));
            map.insert("importance".into(), json!(3.0));
            assert_eq!(Record::from_map(map).unwrap().importance(), 1.0);
        }

        #[test]
        fn test_from_map_rejects_malformed() {
            let mut missing_content = Map::new();
            missing_content.insert("id".into(), json!("a"));
            let err = Record::from_map(missing_content).unwrap_err();
            assert!(matches!(err, StrataError::InvalidRecord(_)));

            let mut empty_id = Map::new();
            empty_id.insert("id".into(), json!(""));
            empty_id.insert("content".into(), json!("x"));
            assert!(Record::from_map(empty_id).is_err());

            let mut bad_kind = Map::new();
            bad_kind.insert("content".into(), json!("x"));
            bad_kind.insert("relations".into(), json!({"kind": "forever"}));
            assert!(Record::from_map(bad_kind).is_err());
        }

        #[test]
        fn test_relations_omitted_when_empty() {
            let map = Record::new("plain").to_map();
            assert!(!map.contains_key("relations"));
            assert!(!map.contains_key("embedding"));

            let map = Record::new("x").with_kind(MemoryKind::ShortTerm).to_map();
            assert_eq!(map["relations"]["kind"], Value::from("short_term"));
        }
    }

    // ── Type tests ─────────────────────────────────────────────

    mod kinds {
        use super::*;

        #[test]
        fn test_memory_kind_parse_and_display() {
            for kind in [MemoryKind::ShortTerm, MemoryKind::LongTerm, MemoryKind::Episodic] {
                assert_eq!(kind.as_str().parse::<MemoryKind>().unwrap(), kind);
                assert_eq!(kind.to_string(), kind.as_str());
            }
            assert!("medium_term".parse::<MemoryKind>().is_err());
            assert!(!MemoryKind::ShortTerm.is_graph());
            assert!(MemoryKind::Episodic.is_graph());
        }

        #[test]
        fn test_ttl_never_differs_from_zero() {
            assert_ne!(Ttl::Never, Ttl::secs(0));
            assert_eq!(Ttl::secs(0), Ttl::After(Duration::ZERO));
            assert_eq!(Ttl::default(), Ttl::Default);
        }

        #[test]
        fn test_scored_record_id() {
            let s = ScoredRecord::new(Record::new("x").with_id("abc"), 0.4);
            assert_eq!(s.id(), "abc");
        }
    }

    // ── Filter tests ───────────────────────────────────────────

    mod filters {
        use super::*;

        fn sample() -> Record {
            Record::new("sample")
                .with_tags(["a", "b"])
                .with_importance(0.6)
                .with_timestamp(100.0)
                .with_source("chat")
                .with_metadata("lang", "en")
                .with_context("ctx")
                .with_episode("ep")
        }

        #[test]
        fn test_empty_filter_matches_everything() {
            assert!(MemoryFilter::new().matches(&sample()));
        }

        #[test]
        fn test_tag_any_vs_all() {
            let r = sample();
            assert!(MemoryFilter::new().tags(["a", "z"], false).matches(&r));
            assert!(!MemoryFilter::new().tags(["a", "z"], true).matches(&r));
            assert!(MemoryFilter::new().tags(["a", "b"], true).matches(&r));
        }

        #[test]
        fn test_ranges_are_inclusive() {
            let r = sample();
            assert!(MemoryFilter::new().importance(0.6, 0.6).matches(&r));
            assert!(!MemoryFilter::new().importance(0.7, 1.0).matches(&r));
            assert!(MemoryFilter::new().time_range(100.0, 200.0).matches(&r));
            assert!(!MemoryFilter::new().time_range(101.0, 200.0).matches(&r));
        }

        #[test]
        fn test_categories_intersect() {
            let r = sample();
            let f = MemoryFilter::new().tags(["a"], false).source("email");
            assert!(!f.matches(&r));
            let f = MemoryFilter::new()
                .tags(["a"], false)
                .source("chat")
                .metadata("lang", "en")
                .context("ctx")
                .episode("ep");
            assert!(f.matches(&r));
            assert!(!MemoryFilter::new().context("other").matches(&r));
            assert!(!MemoryFilter::new().metadata("lang", "fr").matches(&r));
        }
    }

    // ── Clock tests ────────────────────────────────────────────

    mod clocks {
        use super::*;

        #[test]
        fn test_manual_clock_shared_between_clones() {
            let clock = ManualClock::new(10.0);
            let other = clock.clone();
            clock.advance(Duration::from_millis(1500));
            assert_eq!(other.now(), 11.5);
            other.set(3.0);
            assert_eq!(clock.now(), 3.0);
        }

        #[test]
        fn test_system_clock_moves_forward() {
            let a = SystemClock.now();
            let b = SystemClock.now();
            assert!(b >= a);
        }
    }

    // ── Error tests ────────────────────────────────────────────

    mod errors {
        use super::*;

        #[test]
        fn test_error_display() {
            let e = StrataError::MissingEmbedding { id: "r1".into() };
            assert_eq!(e.to_string(), "record r1 has no embedding");
            let e = StrataError::DimensionMismatch {
                id: "r2".into(),
                expected: 3,
                actual: 2,
            };
            assert!(e.to_string().contains("expected 3, got 2"));
        }

        #[test]
        fn test_caller_error_classification() {
            assert!(StrataError::MissingEmbedding { id: "x".into() }.is_caller_error());
            assert!(StrataError::InvalidRecord("bad".into()).is_caller_error());
            assert!(!StrataError::Backend("disk".into()).is_caller_error());
            assert!(!StrataError::Embedding("timeout".into()).is_caller_error());
        }

        #[test]
        fn test_from_conversions() {
            let io: StrataError = std::io::Error::other("boom").into();
            assert!(matches!(io, StrataError::Io(_)));
            let other: StrataError = anyhow::anyhow!("wrapped").into();
            assert_eq!(other.to_string(), "wrapped");
        }
    }
}
