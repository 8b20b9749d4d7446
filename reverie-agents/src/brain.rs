//! Per-agent cognition loop.
//!
//! One [`AgentBrain::tick`] runs the phases strictly in order:
//!
//! ```text
//! Perceive → Store → (Reflect?) → Determine → React → Act
//! ```
//!
//! Collaborator failures degrade inside the phase that hit them: importance
//! falls back to the configured default, retrieval to an empty set, and the
//! reaction to silence. Only structural errors (a wrong embedding dimension,
//! say) abort the tick.

use std::sync::Arc;
use std::time::Instant;

use reverie_core::config::{Language, ReactionConfig};
use reverie_core::dialogue::DialogueTurn;
use reverie_core::error::Result;
use reverie_core::memory::MemoryRecord;
use reverie_core::persona::AgentProfile;
use reverie_core::reaction::{ReactionDecider, ReactionDecision, ReactionRequest, RepetitionGuard};
use reverie_core::reflection::ReflectionPipeline;
use reverie_core::service::MemoryService;
use reverie_core::types::Timestamp;
use tracing::{debug, info, warn};

use crate::perception::{Percept, observation_text};
use crate::query::retrieval_query;
use crate::repetition::{offending_sentences, recent_sentences};

/// Input to one tick.
#[derive(Debug, Clone)]
pub struct TickInput {
    /// Simulation time of the tick.
    pub now: Timestamp,
    /// Shared scene description.
    pub world_context: Option<String>,
    /// Who or what the agent can see.
    pub observed_entities: Vec<String>,
    /// Events noticed this tick, on top of the queued inbox.
    pub observed_events: Vec<String>,
    /// Recent dialogue from the agent's point of view, oldest first.
    pub dialogue_history: Vec<DialogueTurn>,
}

impl TickInput {
    /// A tick at `now` with nothing else going on.
    #[must_use]
    pub fn at(now: Timestamp) -> Self {
        Self {
            now,
            world_context: None,
            observed_entities: Vec::new(),
            observed_events: Vec::new(),
            dialogue_history: Vec::new(),
        }
    }
}

/// What one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// The observation stored in the Store phase.
    pub observation: MemoryRecord,
    /// Reflections created if the pipeline fired.
    pub reflections: Vec<MemoryRecord>,
    /// Memories retrieved in the Determine phase.
    pub retrieved: Vec<MemoryRecord>,
    /// The final reaction decision.
    pub decision: ReactionDecision,
    /// Decider calls made, including anti-repetition retries.
    pub attempts: u32,
}

impl TickOutcome {
    /// What the agent says this tick, if anything.
    #[must_use]
    pub fn utterance(&self) -> Option<&str> {
        self.decision.spoken()
    }
}

/// One agent: persona, memory, reflection state and a reaction decider.
pub struct AgentBrain {
    profile: AgentProfile,
    memory: MemoryService,
    reflection: ReflectionPipeline,
    decider: Arc<dyn ReactionDecider>,
    reaction: ReactionConfig,
    retrieval_top_k: usize,
    language: Language,
    inbox: Vec<String>,
}

impl AgentBrain {
    /// Assemble a brain from its parts.
    #[must_use]
    pub fn new(
        profile: AgentProfile,
        memory: MemoryService,
        reflection: ReflectionPipeline,
        decider: Arc<dyn ReactionDecider>,
        reaction: ReactionConfig,
        retrieval_top_k: usize,
        language: Language,
    ) -> Self {
        Self {
            profile,
            memory,
            reflection,
            decider,
            reaction,
            retrieval_top_k,
            language,
            inbox: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Stable agent id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.profile.identity().id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.profile.name()
    }

    /// The agent's persona.
    #[must_use]
    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Mutable persona, e.g. to push or pop plans.
    pub fn profile_mut(&mut self) -> &mut AgentProfile {
        &mut self.profile
    }

    /// The agent's memory.
    #[must_use]
    pub fn memory(&self) -> &MemoryService {
        &self.memory
    }

    /// The reflection trigger state.
    #[must_use]
    pub fn reflection(&self) -> &ReflectionPipeline {
        &self.reflection
    }

    /// Events waiting for the next Perceive phase.
    #[must_use]
    pub fn pending_observations(&self) -> &[String] {
        &self.inbox
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Queue an event for the next Perceive phase. Blank text is ignored.
    pub fn queue_observation(&mut self, content: impl Into<String>) {
        let content = content.into();
        if !content.trim().is_empty() {
            self.inbox.push(content);
        }
    }

    /// Store a pre-authored memory, skipping Perceive, Determine and React.
    ///
    /// Its importance still counts toward the reflection threshold.
    ///
    /// # Errors
    /// Encoder failures and embedding dimension mismatches.
    pub async fn ingest_seed_memory(
        &mut self,
        content: &str,
        now: Timestamp,
        importance: Option<i64>,
    ) -> Result<MemoryRecord> {
        let context = self.profile.observation_context();
        let record = self
            .memory
            .create_observation_from_text(content, now, &context, importance)
            .await?;
        self.reflection
            .record_observation_importance(i64::from(record.importance));
        debug!(
            agent = %self.id(),
            memory_id = %record.id,
            importance = record.importance,
            "Seed memory stored"
        );
        Ok(record)
    }

    /// Run one full tick.
    ///
    /// # Errors
    /// Failing to embed or store the observation, and structural errors
    /// while reflecting or retrieving.
    pub async fn tick(&mut self, input: TickInput) -> Result<TickOutcome> {
        let start = Instant::now();
        let now = input.now;

        // Perceive. The inbox is only cleared once the observation is stored.
        let events: Vec<String> = self
            .inbox
            .iter()
            .chain(&input.observed_events)
            .cloned()
            .collect();
        let content = observation_text(
            &self.profile,
            &Percept {
                now,
                world_context: input.world_context.as_deref(),
                observed_entities: &input.observed_entities,
                observed_events: &events,
            },
        );
        let embedding = self.memory.encode(&content).await?;

        // Store.
        let context = self.profile.observation_context();
        let observation = self
            .memory
            .create_observation(&content, now, embedding, &context, None)
            .await?;
        self.inbox.clear();
        self.reflection
            .record_observation_importance(i64::from(observation.importance));
        debug!(
            agent = %self.id(),
            memory_id = %observation.id,
            importance = observation.importance,
            "Perceived"
        );

        // Reflect.
        let reflections = if self.reflection.should_reflect() {
            self.reflection
                .run_reflection(&mut self.memory, now, &context)
                .await?
        } else {
            Vec::new()
        };

        // Determine.
        let query = retrieval_query(&self.profile, &content, &input.dialogue_history);
        let retrieved = match self
            .memory
            .get_retrieval_memories(&query, now, self.retrieval_top_k)
            .await
        {
            Ok(records) => records,
            Err(e) if e.is_recoverable() => {
                warn!(
                    agent = %self.id(),
                    error = %e,
                    "Retrieval failed, reacting without memories"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        // React.
        let request = ReactionRequest {
            profile: self.profile.clone(),
            current_time: now,
            observation: content,
            dialogue_history: input.dialogue_history,
            retrieved_memories: retrieved.clone(),
            language: self.language,
            repetition_guard: None,
        };
        let (decision, attempts) = self.react(request).await;

        // Act.
        if let Some(utterance) = decision.spoken() {
            self.inbox.push(format!("I decided to react: {utterance}"));
        }

        info!(
            agent = %self.id(),
            reflections = reflections.len(),
            retrieved = retrieved.len(),
            reacted = decision.spoken().is_some(),
            attempts,
            elapsed_us = start.elapsed().as_micros(),
            "Tick complete"
        );

        Ok(TickOutcome {
            observation,
            reflections,
            retrieved,
            decision,
            attempts,
        })
    }

    /// Ask the decider, retrying with a repetition guard while the candidate
    /// overlaps recent dialogue. The last candidate is kept once retries run
    /// out.
    async fn react(&self, mut request: ReactionRequest) -> (ReactionDecision, u32) {
        let recent = recent_sentences(
            &request.dialogue_history,
            self.reaction.recent_sentence_window,
        );
        let timeout = self.memory.collaborator_timeout();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let decided = tokio::time::timeout(timeout, self.decider.decide(&request)).await;
            let decision = match decided {
                Ok(Ok(decision)) => decision,
                Ok(Err(e)) => {
                    warn!(
                        agent = %self.id(),
                        error = %e,
                        "Reaction decider failed, staying silent"
                    );
                    return (ReactionDecision::silent("decider error"), attempts);
                }
                Err(_) => {
                    warn!(
                        agent = %self.id(),
                        timeout_ms = timeout.as_millis(),
                        "Reaction decider timed out, staying silent"
                    );
                    return (ReactionDecision::silent("decider timeout"), attempts);
                }
            };

            let Some(candidate) = decision.spoken() else {
                return (decision, attempts);
            };
            if attempts > self.reaction.max_retries {
                return (decision, attempts);
            }
            let offending = offending_sentences(
                candidate,
                &recent,
                self.reaction.overlap_ngram,
                self.reaction.overlap_threshold,
            );
            if offending.is_empty() {
                return (decision, attempts);
            }

            debug!(
                agent = %self.id(),
                attempt = attempts,
                overlapping = offending.len(),
                "Candidate too close to recent dialogue, retrying"
            );
            request.repetition_guard = Some(RepetitionGuard {
                offending_sentences: offending,
                rejected_candidate: candidate.to_string(),
                max_overlap: self.reaction.overlap_threshold,
            });
        }
    }
}

impl std::fmt::Debug for AgentBrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBrain")
            .field("id", &self.id())
            .field("memories", &self.memory.len())
            .field("accumulated_importance", &self.reflection.accumulated_importance())
            .field("inbox", &self.inbox.len())
            .finish_non_exhaustive()
    }
}
