//! Tick state machine tests with deterministic collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reverie_agents::{AgentBrain, Collaborators, TickInput, build_agent};
use reverie_core::dialogue::DialogueTurn;
use reverie_core::embedding::{EmbeddingEncoder, HashingEmbeddingEncoder};
use reverie_core::error::{Result, ReverieError};
use reverie_core::persona::{AgentIdentity, AgentProfile, ExtendedPersona, FixedPersona};
use reverie_core::reaction::{
    ReactionDecider, ReactionDecision, ReactionRequest, ScriptedReactionDecider,
};
use reverie_core::types::{Embedding, MemoryKind, Timestamp};
use reverie_core::ReverieConfig;

fn config() -> ReverieConfig {
    let mut config = ReverieConfig::default();
    config.memory.embedding_dimension = 64;
    config.memory.fallback_importance = 5;
    config
}

fn mina() -> AgentProfile {
    AgentProfile::new(
        AgentIdentity {
            id: "mina".into(),
            name: "Mina".into(),
            age: 29,
            traits: vec!["curious".into()],
        },
        FixedPersona {
            identity_stable_set: vec!["Runs the bakery on Elm Street".into()],
        },
        ExtendedPersona {
            lifestyle_and_routine: Vec::new(),
            current_plan_context: vec!["Prepare the festival order".into()],
        },
    )
    .expect("valid profile")
}

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 2, 14, 9, 0, 0).single().expect("valid time")
}

fn brain_with(config: &ReverieConfig, decider: Arc<dyn ReactionDecider>) -> AgentBrain {
    build_agent(mina(), config, &Collaborators::offline(config, decider))
}

struct FailingDecider;

#[async_trait]
impl ReactionDecider for FailingDecider {
    async fn decide(&self, _request: &ReactionRequest) -> Result<ReactionDecision> {
        Err(ReverieError::Collaborator("connection refused".into()))
    }
}

struct SlowDecider;

#[async_trait]
impl ReactionDecider for SlowDecider {
    async fn decide(&self, _request: &ReactionRequest) -> Result<ReactionDecision> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        Ok(ReactionDecision::speak("too late", "slow"))
    }
}

/// Hashing encoder whose first `failures` calls fail.
struct FlakyEncoder {
    inner: HashingEmbeddingEncoder,
    failures: AtomicUsize,
}

impl FlakyEncoder {
    fn new(dimensions: usize, failures: usize) -> Self {
        Self {
            inner: HashingEmbeddingEncoder::new(dimensions),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl EmbeddingEncoder for FlakyEncoder {
    async fn encode(&self, text: &str) -> Result<Embedding> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ReverieError::Collaborator("embedding backend unreachable".into()));
        }
        self.inner.encode(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn tick_stores_one_observation_and_folds_inbox() {
    let config = config();
    let decider = Arc::new(ScriptedReactionDecider::new([ReactionDecision::speak(
        "Hello, Jun!",
        "greet",
    )]));
    let mut brain = brain_with(&config, decider.clone());

    brain.queue_observation("Jun said: Good morning");
    brain.queue_observation("   ");
    assert_eq!(brain.pending_observations().len(), 1);

    let mut input = TickInput::at(t0());
    input.observed_entities = vec!["Jun".into()];
    let outcome = brain.tick(input).await.expect("tick");

    assert_eq!(brain.memory().len(), 1);
    assert_eq!(outcome.observation.kind, MemoryKind::Observation);
    assert!(outcome.observation.citations.is_empty());
    assert!(outcome.observation.content.contains("events: Jun said: Good morning"));
    assert!(outcome.observation.content.contains("entities: Jun;"));
    assert!(outcome.observation.content.contains("plan: Prepare the festival order"));
    assert_eq!(outcome.observation.importance, 5);
    assert_eq!(outcome.utterance(), Some("Hello, Jun!"));
    assert_eq!(outcome.attempts, 1);

    // Act queues the speech act for the next tick.
    assert_eq!(
        brain.pending_observations(),
        ["I decided to react: Hello, Jun!".to_string()]
    );

    let second = brain.tick(TickInput::at(t0())).await.expect("tick");
    assert!(second.observation.content.contains("I decided to react: Hello, Jun!"));
    assert!(second.utterance().is_none());
    assert!(brain.pending_observations().is_empty());
    assert_eq!(brain.memory().len(), 2);

    let request = &decider.requests()[0];
    assert_eq!(request.observation, outcome.observation.content);
    assert_eq!(request.retrieved_memories.len(), 1);
}

#[tokio::test]
async fn repetitive_candidate_is_retried_with_guard() {
    let config = config();
    let decider = Arc::new(ScriptedReactionDecider::new([
        ReactionDecision::speak("Good morning to you my friend", "echo"),
        ReactionDecision::speak("good morning to you, my friend!", "echo again"),
        ReactionDecision::speak("Want to try the new rye bread?", "offer"),
    ]));
    let mut brain = brain_with(&config, decider.clone());

    let mut input = TickInput::at(t0());
    input.dialogue_history = vec![DialogueTurn::pending("Good morning to you my friend")];
    let outcome = brain.tick(input).await.expect("tick");

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.utterance(), Some("Want to try the new rye bread?"));

    let requests = decider.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].repetition_guard.is_none());
    let guard = requests[1].repetition_guard.as_ref().expect("guard on retry");
    assert_eq!(guard.rejected_candidate, "Good morning to you my friend");
    assert_eq!(guard.offending_sentences, vec!["Good morning to you my friend".to_string()]);
    assert!((guard.max_overlap - 0.5).abs() < f64::EPSILON);
    let guard = requests[2].repetition_guard.as_ref().expect("guard on second retry");
    assert_eq!(guard.rejected_candidate, "good morning to you, my friend!");
}

#[tokio::test]
async fn retries_are_bounded_and_last_candidate_kept() {
    let config = config();
    let decider = Arc::new(ScriptedReactionDecider::responding_with(|_| {
        ReactionDecision::speak("Good morning to you my friend", "stuck")
    }));
    let mut brain = brain_with(&config, decider.clone());

    let mut input = TickInput::at(t0());
    input.dialogue_history = vec![DialogueTurn::pending("Good morning to you my friend")];
    let outcome = brain.tick(input).await.expect("tick");

    assert_eq!(outcome.attempts, config.reaction.max_retries + 1);
    assert_eq!(decider.call_count(), 3);
    assert_eq!(outcome.utterance(), Some("Good morning to you my friend"));
}

#[tokio::test]
async fn no_dialogue_means_no_repetition_check() {
    let config = config();
    let decider = Arc::new(ScriptedReactionDecider::responding_with(|_| {
        ReactionDecision::speak("Good morning", "greet")
    }));
    let mut brain = brain_with(&config, decider.clone());
    let outcome = brain.tick(TickInput::at(t0())).await.expect("tick");
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn decider_failure_is_silence() {
    let config = config();
    let mut brain = brain_with(&config, Arc::new(FailingDecider));
    let outcome = brain.tick(TickInput::at(t0())).await.expect("tick survives");
    assert!(outcome.utterance().is_none());
    assert_eq!(outcome.decision.reason, "decider error");
    assert!(brain.pending_observations().is_empty());
    assert_eq!(brain.memory().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn decider_timeout_is_silence() {
    let mut config = config();
    config.memory.collaborator_timeout_ms = 100;
    let mut brain = brain_with(&config, Arc::new(SlowDecider));
    let outcome = brain.tick(TickInput::at(t0())).await.expect("tick survives");
    assert!(outcome.utterance().is_none());
    assert_eq!(outcome.decision.reason, "decider timeout");
}

#[tokio::test]
async fn seed_memory_is_clamped_and_counts_toward_reflection() {
    let config = config();
    let mut brain = brain_with(&config, Arc::new(ScriptedReactionDecider::new([])));
    let record = brain
        .ingest_seed_memory("Grandmother taught Mina to bake", t0(), Some(42))
        .await
        .expect("seed");
    assert_eq!(record.importance, 10);
    assert_eq!(record.kind, MemoryKind::Observation);
    assert_eq!(brain.reflection().accumulated_importance(), 10);

    let scored = brain
        .ingest_seed_memory("Mina likes rain", t0(), None)
        .await
        .expect("seed");
    assert_eq!(scored.importance, 5);
    assert_eq!(brain.reflection().accumulated_importance(), 15);
}

#[tokio::test]
async fn reflection_fires_inside_tick_at_threshold() {
    let mut config = config();
    config.reflection.threshold = 10;
    let mut brain = brain_with(&config, Arc::new(ScriptedReactionDecider::new([])));
    brain
        .ingest_seed_memory("Jun ordered a cake for Saturday", t0(), Some(5))
        .await
        .expect("seed");

    let outcome = brain.tick(TickInput::at(t0())).await.expect("tick");
    assert!(!outcome.reflections.is_empty());
    for reflection in &outcome.reflections {
        assert_eq!(reflection.kind, MemoryKind::Reflection);
        assert!(reflection.citations.iter().all(|c| *c < reflection.id));
    }
    assert_eq!(brain.memory().len(), 2 + outcome.reflections.len());
    // Carry-over keeps only the excess over the threshold.
    assert_eq!(brain.reflection().accumulated_importance(), 0);
}

#[tokio::test]
async fn failed_perceive_keeps_queued_observations() {
    let config = config();
    let mut collaborators =
        Collaborators::offline(&config, Arc::new(ScriptedReactionDecider::new([])));
    collaborators.encoder = Arc::new(FlakyEncoder::new(config.memory.embedding_dimension, 1));
    let mut brain = build_agent(mina(), &config, &collaborators);

    brain.queue_observation("Jun said: the oven is on fire");
    let err = brain
        .tick(TickInput::at(t0()))
        .await
        .expect_err("encoder is down");
    assert!(err.is_recoverable());
    assert_eq!(brain.memory().len(), 0);
    assert_eq!(
        brain.pending_observations(),
        ["Jun said: the oven is on fire".to_string()]
    );

    let outcome = brain.tick(TickInput::at(t0())).await.expect("tick");
    assert!(outcome
        .observation
        .content
        .ends_with("events: Jun said: the oven is on fire"));
    assert!(brain.pending_observations().is_empty());
    assert_eq!(brain.memory().len(), 1);
}
