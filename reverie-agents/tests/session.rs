//! Conversation session bookkeeping and turn driving.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reverie_agents::{AgentBrain, Collaborators, ConversationSession, build_agent};
use reverie_core::config::SessionConfig;
use reverie_core::dialogue::DialogueTurn;
use reverie_core::embedding::{EmbeddingEncoder, HashingEmbeddingEncoder};
use reverie_core::error::{Result, ReverieError};
use reverie_core::persona::{AgentIdentity, AgentProfile, ExtendedPersona, FixedPersona};
use reverie_core::reaction::{ReactionDecider, ReactionDecision, ScriptedReactionDecider};
use reverie_core::types::{Embedding, Timestamp};
use reverie_core::ReverieConfig;

fn config() -> ReverieConfig {
    let mut config = ReverieConfig::default();
    config.memory.embedding_dimension = 32;
    config
}

fn profile(id: &str, name: &str) -> AgentProfile {
    AgentProfile::new(
        AgentIdentity {
            id: id.into(),
            name: name.into(),
            age: 30,
            traits: Vec::new(),
        },
        FixedPersona::default(),
        ExtendedPersona::default(),
    )
    .expect("valid profile")
}

fn agents(ids: &[(&str, &str)], decider: Arc<dyn ReactionDecider>) -> Vec<AgentBrain> {
    let config = config();
    let collaborators = Collaborators::offline(&config, decider);
    ids.iter()
        .map(|(id, name)| build_agent(profile(id, name), &config, &collaborators))
        .collect()
}

fn silent() -> Arc<dyn ReactionDecider> {
    Arc::new(ScriptedReactionDecider::new([]))
}

fn pair() -> ConversationSession {
    ConversationSession::new(agents(&[("a", "A"), ("b", "B")], silent()), &SessionConfig::default())
        .expect("session")
}

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 2, 14, 9, 0, 0).single().expect("valid time")
}

/// Hashing encoder that fails while `down` is set.
struct SwitchableEncoder {
    inner: HashingEmbeddingEncoder,
    down: Arc<AtomicBool>,
}

#[async_trait]
impl EmbeddingEncoder for SwitchableEncoder {
    async fn encode(&self, text: &str) -> Result<Embedding> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ReverieError::Collaborator("embedding backend unreachable".into()));
        }
        self.inner.encode(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        "switchable"
    }
}

#[test]
fn construction_is_validated() {
    let err = ConversationSession::new(agents(&[("a", "A")], silent()), &SessionConfig::default())
        .expect_err("one agent");
    assert!(matches!(err, ReverieError::InvalidSession(_)));

    let zero_window = SessionConfig {
        dialogue_window: Some(0),
        ..SessionConfig::default()
    };
    let err = ConversationSession::new(agents(&[("a", "A"), ("b", "B")], silent()), &zero_window)
        .expect_err("zero window");
    assert!(matches!(err, ReverieError::InvalidSession(_)));

    let duplicates = agents(&[("a", "A"), ("a", "Again")], silent());
    let err = ConversationSession::new(duplicates, &SessionConfig::default())
        .expect_err("duplicate ids");
    assert!(matches!(err, ReverieError::InvalidSession(_)));
}

#[test]
fn speakers_rotate_round_robin() {
    let session = ConversationSession::new(
        agents(&[("a", "A"), ("b", "B"), ("c", "C")], silent()),
        &SessionConfig::default(),
    )
    .expect("session");
    let order: Vec<String> = (0..5).map(|_| session.next_speaker()).collect();
    assert_eq!(order, vec!["a", "b", "c", "a", "b"]);
}

#[tokio::test]
async fn dialogue_bookkeeping() {
    let session = pair();

    // Nothing queued: the reply opens a turn with no partner line.
    assert_eq!(session.consume_incoming_partner_utterance("a").expect("known"), None);
    session.commit_speaker_reply("a", None, "Hi B").expect("commit");
    session.broadcast_reply("a", "Hi B").await.expect("broadcast");
    assert_eq!(
        session.dialogue_context_for("a").expect("known"),
        vec![DialogueTurn::new("", "Hi B")]
    );

    // B received it as an incoming utterance and as an observation.
    assert!(session.dialogue_context_for("b").expect("known").is_empty());
    let incoming = session.consume_incoming_partner_utterance("b").expect("known");
    assert_eq!(incoming.as_deref(), Some("Hi B"));
    assert_eq!(
        session.dialogue_context_for("b").expect("known"),
        vec![DialogueTurn::pending("Hi B")]
    );
    session
        .commit_speaker_reply("b", incoming.as_deref(), "Hello A")
        .expect("commit");
    assert_eq!(
        session.dialogue_context_for("b").expect("known"),
        vec![DialogueTurn::new("Hi B", "Hello A")]
    );

    assert_eq!(
        session.brain("b").await.expect("known").pending_observations(),
        ["A said: Hi B".to_string()]
    );
    assert_eq!(
        session.brain("a").await.expect("known").pending_observations(),
        ["I said: Hi B".to_string()]
    );
    assert_eq!(
        session.transcript(),
        vec![
            ("a".to_string(), "Hi B".to_string()),
            ("b".to_string(), "Hello A".to_string()),
        ]
    );
}

#[test]
fn window_limits_dialogue_context() {
    let window = SessionConfig {
        dialogue_window: Some(2),
        ..SessionConfig::default()
    };
    let session = ConversationSession::new(agents(&[("a", "A"), ("b", "B")], silent()), &window)
        .expect("session");
    for reply in ["one", "two", "three"] {
        session.commit_speaker_reply("a", None, reply).expect("commit");
    }
    let context = session.dialogue_context_for("a").expect("known");
    assert_eq!(context, vec![DialogueTurn::new("", "two"), DialogueTurn::new("", "three")]);
}

#[test]
fn unknown_agents_are_reported() {
    let session = pair();
    assert!(matches!(
        session.dialogue_context_for("zed"),
        Err(ReverieError::UnknownAgent(_))
    ));
    assert!(matches!(
        session.commit_speaker_reply("zed", None, "hi"),
        Err(ReverieError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn failed_tick_uses_fallback_and_session_continues() {
    let config = config();
    // Encoder of the wrong size: every Perceive fails structurally.
    let mut collaborators = Collaborators::offline(
        &config,
        Arc::new(ScriptedReactionDecider::responding_with(|_| {
            ReactionDecision::speak("unused", "n/a")
        })),
    );
    collaborators.encoder = Arc::new(HashingEmbeddingEncoder::new(8));
    let brains = vec![
        build_agent(profile("a", "A"), &config, &collaborators),
        build_agent(profile("b", "B"), &config, &collaborators),
    ];
    let session_config = SessionConfig {
        fallback_utterance: Some("Sorry, say that again?".into()),
        ..SessionConfig::default()
    };
    let session = ConversationSession::new(brains, &session_config).expect("session");

    let turns = session.run(4, t0(), Duration::minutes(1)).await.expect("run");
    assert_eq!(turns.len(), 4);
    assert!(turns.iter().all(|t| t.utterance.as_deref() == Some("Sorry, say that again?")));
    assert_eq!(session.brain("a").await.expect("known").memory().len(), 0);
}

#[tokio::test]
async fn silent_speaker_leaves_turn_pending() {
    let session = ConversationSession::new(
        agents(&[("a", "A"), ("b", "B")], silent()),
        &SessionConfig::default(),
    )
    .expect("session");
    session.commit_speaker_reply("a", None, "Anyone there?").expect("commit");
    session.broadcast_reply("a", "Anyone there?").await.expect("broadcast");

    // Turn 0 is a's, turn 1 is b's; b stays silent.
    session.run_turn(t0()).await.expect("turn");
    let record = session.run_turn(t0()).await.expect("turn");
    assert_eq!(record.speaker, "b");
    assert!(record.utterance.is_none());
    assert_eq!(
        session.dialogue_context_for("b").expect("known"),
        vec![DialogueTurn::pending("Anyone there?")]
    );
}

#[tokio::test]
async fn partner_line_survives_a_transient_tick_failure() {
    let config = config();
    let down = Arc::new(AtomicBool::new(false));
    let mut collaborators = Collaborators::offline(&config, silent());
    collaborators.encoder = Arc::new(SwitchableEncoder {
        inner: HashingEmbeddingEncoder::new(config.memory.embedding_dimension),
        down: Arc::clone(&down),
    });
    let brains = vec![
        build_agent(profile("a", "A"), &config, &collaborators),
        build_agent(profile("b", "B"), &config, &collaborators),
    ];
    let session = ConversationSession::new(brains, &SessionConfig::default()).expect("session");
    session.commit_speaker_reply("a", None, "Anyone home?").expect("commit");
    session.broadcast_reply("a", "Anyone home?").await.expect("broadcast");

    session.run_turn(t0()).await.expect("a's turn");
    down.store(true, Ordering::SeqCst);
    let failed = session.run_turn(t0()).await.expect("b's turn");
    assert_eq!(failed.speaker, "b");
    assert!(failed.utterance.is_none());
    assert_eq!(session.brain("b").await.expect("known").memory().len(), 0);

    down.store(false, Ordering::SeqCst);
    session.run_turn(t0()).await.expect("a's turn");
    session.run_turn(t0()).await.expect("b's turn");

    let brain = session.brain("b").await.expect("known");
    let records = brain.memory().log().records();
    assert_eq!(records.len(), 1);
    assert!(records[0].content.contains("A said: Anyone home?"));
}
