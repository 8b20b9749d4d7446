//! Two agents talking for a handful of turns with offline collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, TimeZone, Utc};
use reverie_agents::{Collaborators, ConversationSession, build_agent};
use reverie_core::config::SessionConfig;
use reverie_core::dialogue::DialogueTurn;
use reverie_core::persona::{AgentIdentity, AgentProfile, ExtendedPersona, FixedPersona};
use reverie_core::reaction::{ReactionDecision, ScriptedReactionDecider};
use reverie_core::ReverieConfig;

const TOPICS: [&str; 12] = [
    "sourdough starter",
    "harbour fog",
    "chess openings",
    "garden tomatoes",
    "train timetables",
    "violin strings",
    "mountain trails",
    "pottery glaze",
    "winter coats",
    "library hours",
    "kite festival",
    "lantern repair",
];

fn profile(id: &str, name: &str, plan: &str) -> AgentProfile {
    AgentProfile::new(
        AgentIdentity {
            id: id.into(),
            name: name.into(),
            age: 31,
            traits: vec!["talkative".into()],
        },
        FixedPersona {
            identity_stable_set: vec![format!("{name} lives in the harbour town")],
        },
        ExtendedPersona {
            lifestyle_and_routine: vec!["Walks to the market every morning".into()],
            current_plan_context: vec![plan.into()],
        },
    )
    .expect("valid profile")
}

#[tokio::test]
async fn two_agents_converse_and_reflect() {
    let mut config = ReverieConfig::default();
    config.memory.embedding_dimension = 48;
    config.memory.fallback_importance = 5;
    config.reflection.threshold = 15;

    let counter = AtomicUsize::new(0);
    let decider = Arc::new(ScriptedReactionDecider::responding_with(move |request| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let topic = TOPICS[n % TOPICS.len()];
        ReactionDecision::speak(
            format!("{} wonders about {topic} number {n}", request.identity().name),
            "keep talking",
        )
    }));
    let collaborators = Collaborators::offline(&config, decider.clone());

    let start = Utc.with_ymd_and_hms(2024, 2, 14, 9, 0, 0).single().expect("valid time");
    let mut mina = build_agent(
        profile("mina", "Mina", "Bake for the festival"),
        &config,
        &collaborators,
    );
    let mut jun = build_agent(
        profile("jun", "Jun", "Fix the lighthouse lamp"),
        &config,
        &collaborators,
    );
    mina.ingest_seed_memory("Jun owes me a loaf of rye", start, None)
        .await
        .expect("seed");
    jun.ingest_seed_memory("Mina's bakery opens at seven", start, None)
        .await
        .expect("seed");

    let session =
        ConversationSession::new(vec![mina, jun], &SessionConfig::default()).expect("session");
    let turns = session.run(10, start, Duration::minutes(1)).await.expect("run");

    assert_eq!(turns.len(), 10);
    assert!(turns.iter().all(|t| t.utterance.is_some()), "everyone speaks");
    for (i, turn) in turns.iter().enumerate() {
        assert_eq!(turn.turn, i);
        assert_eq!(turn.speaker, if i % 2 == 0 { "mina" } else { "jun" });
    }

    let reflections: usize = turns.iter().map(|t| t.reflections).sum();
    assert!(reflections > 0, "threshold 15 with importance 5 must trigger reflection");

    let mut stored = 0;
    for id in ["mina", "jun"] {
        let brain = session.brain(id).await.expect("known");
        let records = brain.memory().log().records();
        stored += records.len();
        for record in records.iter().filter(|r| r.is_reflection()) {
            assert!(!record.citations.is_empty());
            assert!(record.citations.iter().all(|c| *c < record.id));
        }
    }
    assert_eq!(stored, 2 + 10 + reflections);

    // Each reply answers the partner's previous line.
    let transcript = session.transcript();
    assert_eq!(transcript.len(), 10);
    let jun_view = session.dialogue_context_for("jun").expect("known");
    assert_eq!(jun_view.len(), 5);
    for (k, turn) in jun_view.iter().enumerate() {
        assert_eq!(
            turn,
            &DialogueTurn::new(transcript[2 * k].1.clone(), transcript[2 * k + 1].1.clone())
        );
    }
    let mina_view = session.dialogue_context_for("mina").expect("known");
    assert_eq!(mina_view[0], DialogueTurn::new("", transcript[0].1.clone()));
    assert!(mina_view.iter().all(|t| !t.is_pending()));
    assert!(decider.call_count() >= 10);
}
