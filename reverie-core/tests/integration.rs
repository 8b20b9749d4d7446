//! Integration tests: end-to-end memory flows.
//!
//! Observation scoring → retrieval → reflection → persistence, wired with
//! the deterministic in-memory collaborators.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use reverie_core::config::{ReflectionConfig, ReverieConfig, RolloverKind};
use reverie_core::embedding::HashingEmbeddingEncoder;
use reverie_core::importance::{FixedImportanceScorer, ObservationContext};
use reverie_core::persistence::LogStore;
use reverie_core::reflection::{Insight, ReflectionPipeline, ReflectionStages};
use reverie_core::retrieval::scoring::recency_factor;
use reverie_core::service::{MemoryService, SortOrder};
use reverie_core::types::{MemoryId, MemoryKind, Timestamp};

const DIM: usize = 64;

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 2, 13, 8, 0, 0).single().expect("ts")
}

fn config() -> ReverieConfig {
    let mut config = ReverieConfig::default();
    config.memory.embedding_dimension = DIM;
    config
}

fn service(importance: i64) -> MemoryService {
    MemoryService::new(
        &config(),
        Arc::new(FixedImportanceScorer::new(importance)),
        Arc::new(HashingEmbeddingEncoder::new(DIM)),
    )
}

fn ctx() -> ObservationContext {
    ObservationContext {
        agent_name: "Isabella Rodriguez".into(),
        identity_facts: vec!["owns Hobbs Cafe".into()],
        current_plan: vec!["prepare the Valentine's Day party".into()],
    }
}

// ---------------------------------------------------------------------------
// Citation filtering and clamping through the service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reflection_citations_drop_unknown_and_duplicates() {
    let mut memory = service(4);
    memory
        .create_observation_from_text("Maria is at the cafe", t0(), &ctx(), None)
        .await
        .expect("observe");
    memory
        .create_observation_from_text("Klaus asked about the party", t0(), &ctx(), None)
        .await
        .expect("observe");

    let insight = Insight {
        text: "The party is drawing attention".into(),
        citation_ids: vec![MemoryId(1), MemoryId(999), MemoryId(1), MemoryId(0)],
    };
    let reflection = memory
        .create_reflection(&insight, t0(), &ctx(), Some(8))
        .await
        .expect("reflect");
    assert_eq!(reflection.citations, vec![MemoryId(1), MemoryId(0)]);
    assert_eq!(reflection.importance, 8);
    assert_eq!(reflection.id, MemoryId(2));
}

#[tokio::test]
async fn explicit_importance_clamps_both_ways() {
    let mut memory = service(4);
    let high = memory
        .create_observation_from_text("fire in the kitchen", t0(), &ctx(), Some(42))
        .await
        .expect("observe");
    let low = memory
        .create_observation_from_text("a leaf fell", t0(), &ctx(), Some(-5))
        .await
        .expect("observe");
    assert_eq!((high.importance, low.importance), (10, 1));
}

// ---------------------------------------------------------------------------
// Retrieval refreshes recency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recency_decay_and_refresh() {
    let mut memory = service(5);
    memory
        .create_observation_from_text("the cafe opened at eight", t0(), &ctx(), None)
        .await
        .expect("observe");

    let record = &memory.log().records()[0];
    let one_hour = recency_factor(record.hours_since_access(t0() + Duration::hours(1)), 0.995);
    let hundred_hours = recency_factor(
        record.hours_since_access(t0() + Duration::hours(100)),
        0.995,
    );
    assert!((one_hour - 0.995).abs() < 1e-9);
    assert!((hundred_hours - 0.606).abs() < 1e-3);

    let later = t0() + Duration::hours(100);
    let hits = memory
        .get_retrieval_memories("when does the cafe open", later, 3)
        .await
        .expect("retrieve");
    assert_eq!(hits.len(), 1);
    assert_eq!(memory.log().records()[0].last_accessed_at, later);
}

#[tokio::test]
async fn repeated_retrieval_is_stable() {
    let mut memory = service(5);
    for (hour, text) in [
        (0, "Isabella baked croissants"),
        (1, "Klaus studies gentrification"),
        (2, "Isabella invites Klaus to the party"),
        (3, "the rain stopped"),
    ] {
        memory
            .create_observation_from_text(text, t0() + Duration::hours(hour), &ctx(), None)
            .await
            .expect("observe");
    }
    let now = t0() + Duration::hours(6);
    let ids = |records: Vec<reverie_core::MemoryRecord>| {
        records.into_iter().map(|r| r.id).collect::<Vec<_>>()
    };
    let first = memory
        .get_retrieval_memories("Isabella party", now, 2)
        .await
        .expect("retrieve");
    let second = memory
        .get_retrieval_memories("Isabella party", now, 2)
        .await
        .expect("retrieve");
    let (first, second) = (ids(first), ids(second));
    assert_eq!(first, second);
    assert!(first.contains(&MemoryId(2)));
}

// ---------------------------------------------------------------------------
// Reflection trigger → run → persistence round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reflection_cycle_persists_and_reloads() {
    let config = config();
    let mut memory = service(6);
    let reflection_config = ReflectionConfig {
        threshold: 18,
        rollover: RolloverKind::Reset,
        ..ReflectionConfig::default()
    };
    let mut pipeline = ReflectionPipeline::new(
        reflection_config,
        ReflectionStages::heuristic(memory.encoder(), &config.retrieval),
    );

    let observations = [
        "Isabella decorates the cafe with paper hearts",
        "Maria promises to bring her friends to the party",
        "Klaus says he might come to the party",
    ];
    for (i, text) in observations.iter().enumerate() {
        let record = memory
            .create_observation_from_text(text, t0() + Duration::minutes(i as i64), &ctx(), None)
            .await
            .expect("observe");
        pipeline.record_observation_importance(i64::from(record.importance));
        if i < 2 {
            assert!(!pipeline.should_reflect());
        }
    }
    assert!(pipeline.should_reflect());

    let reflections = pipeline
        .run_reflection(&mut memory, t0() + Duration::minutes(10), &ctx())
        .await
        .expect("reflect");
    assert!(!reflections.is_empty());
    assert_eq!(pipeline.accumulated_importance(), 0);
    for reflection in &reflections {
        assert_eq!(reflection.kind, MemoryKind::Reflection);
        assert!(reflection.citations.iter().all(|c| *c < reflection.id));
    }

    let store = LogStore::open_in_memory().expect("open");
    store.save_log("isabella", memory.log()).expect("save");
    let reloaded = store
        .load_log("isabella", DIM, &config.retrieval)
        .expect("load");
    assert_eq!(reloaded.records(), memory.log().records());

    let newest = memory.get_recent_memories(Some(1), SortOrder::Descending);
    assert_eq!(newest[0].kind, MemoryKind::Reflection);
}
