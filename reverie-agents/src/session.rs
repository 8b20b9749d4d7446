//! Round-robin conversation between two or more agents.
//!
//! The session owns every brain plus two maps keyed by agent id: the
//! dialogue window each speaker sees and the queue of partner utterances it
//! has not answered yet. Both maps are `DashMap`s so each read-modify step
//! touches a single shard.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Duration;
use dashmap::DashMap;
use parking_lot::Mutex;
use reverie_core::config::SessionConfig;
use reverie_core::dialogue::DialogueTurn;
use reverie_core::error::{Result, ReverieError};
use reverie_core::types::Timestamp;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::brain::{AgentBrain, TickInput};

/// Result of one session turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    /// Zero-based turn number.
    pub turn: usize,
    /// Id of the agent whose turn it was.
    pub speaker: String,
    /// What the speaker said; `None` when silent.
    pub utterance: Option<String>,
    /// Reflections the speaker created this turn.
    pub reflections: usize,
}

struct Seat {
    id: String,
    name: String,
    brain: AsyncMutex<AgentBrain>,
}

/// Multi-agent turn scheduler.
pub struct ConversationSession {
    seats: Vec<Seat>,
    turn_index: AtomicUsize,
    window: Option<usize>,
    world_context: Option<String>,
    fallback_utterance: Option<String>,
    histories: DashMap<String, Vec<DialogueTurn>>,
    incoming: DashMap<String, VecDeque<String>>,
    transcript: Mutex<Vec<(String, String)>>,
}

impl ConversationSession {
    /// Seat `agents` in speaking order.
    ///
    /// # Errors
    /// [`ReverieError::InvalidSession`] with fewer than two agents, a
    /// dialogue window of zero, or duplicate agent ids.
    pub fn new(agents: Vec<AgentBrain>, config: &SessionConfig) -> Result<Self> {
        if agents.len() < 2 {
            return Err(ReverieError::InvalidSession(format!(
                "at least two agents are required, got {}",
                agents.len()
            )));
        }
        if config.dialogue_window == Some(0) {
            return Err(ReverieError::InvalidSession(
                "dialogue_window must be at least 1".into(),
            ));
        }
        let mut ids = HashSet::new();
        for agent in &agents {
            if !ids.insert(agent.id().to_string()) {
                return Err(ReverieError::InvalidSession(format!(
                    "duplicate agent id '{}'",
                    agent.id()
                )));
            }
        }

        let histories = DashMap::new();
        let incoming = DashMap::new();
        let seats = agents
            .into_iter()
            .map(|brain| {
                histories.insert(brain.id().to_string(), Vec::new());
                incoming.insert(brain.id().to_string(), VecDeque::new());
                Seat {
                    id: brain.id().to_string(),
                    name: brain.name().to_string(),
                    brain: AsyncMutex::new(brain),
                }
            })
            .collect();

        Ok(Self {
            seats,
            turn_index: AtomicUsize::new(0),
            window: config.dialogue_window,
            world_context: config.world_context.clone(),
            fallback_utterance: config.fallback_utterance.clone(),
            histories,
            incoming,
            transcript: Mutex::new(Vec::new()),
        })
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    /// Agent ids in speaking order.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<String> {
        self.seats.iter().map(|s| s.id.clone()).collect()
    }

    /// Id of the next speaker; advances the round robin.
    #[must_use]
    pub fn next_speaker(&self) -> String {
        let turn = self.turn_index.fetch_add(1, Ordering::SeqCst);
        self.seats[turn % self.seats.len()].id.clone()
    }

    /// Pop the oldest queued utterance for `speaker` and open a pending turn
    /// for it in the speaker's history.
    ///
    /// # Errors
    /// [`ReverieError::UnknownAgent`].
    pub fn consume_incoming_partner_utterance(&self, speaker: &str) -> Result<Option<String>> {
        let utterance = self
            .incoming
            .get_mut(speaker)
            .ok_or_else(|| unknown(speaker))?
            .pop_front();
        if let Some(text) = &utterance {
            self.histories
                .get_mut(speaker)
                .ok_or_else(|| unknown(speaker))?
                .push(DialogueTurn::pending(text.clone()));
        }
        Ok(utterance)
    }

    /// The last `dialogue_window` turns of `speaker`, oldest first.
    ///
    /// # Errors
    /// [`ReverieError::UnknownAgent`].
    pub fn dialogue_context_for(&self, speaker: &str) -> Result<Vec<DialogueTurn>> {
        let history = self.histories.get(speaker).ok_or_else(|| unknown(speaker))?;
        let skip = self
            .window
            .map_or(0, |w| history.len().saturating_sub(w));
        Ok(history.iter().skip(skip).cloned().collect())
    }

    /// Record `reply` in the speaker's history, answering the pending turn
    /// opened for `incoming` or appending a turn with no partner line.
    ///
    /// # Errors
    /// [`ReverieError::UnknownAgent`].
    pub fn commit_speaker_reply(
        &self,
        speaker: &str,
        incoming: Option<&str>,
        reply: &str,
    ) -> Result<()> {
        {
            let mut history = self.histories.get_mut(speaker).ok_or_else(|| unknown(speaker))?;
            let answers_pending = matches!(
                (incoming, history.last()),
                (Some(partner), Some(last)) if last.is_pending() && last.partner == partner
            );
            if answers_pending {
                if let Some(last) = history.last_mut() {
                    last.own = reply.to_string();
                }
            } else {
                history.push(DialogueTurn::new(String::new(), reply));
            }
        }
        self.transcript.lock().push((speaker.to_string(), reply.to_string()));
        Ok(())
    }

    /// Deliver `reply`: a self-observation for the speaker, an observation
    /// plus a queued incoming utterance for everyone else.
    ///
    /// # Errors
    /// [`ReverieError::UnknownAgent`].
    pub async fn broadcast_reply(&self, speaker: &str, reply: &str) -> Result<()> {
        let speaker_name = self.seat(speaker)?.name.clone();
        for seat in &self.seats {
            if seat.id == speaker {
                seat.brain.lock().await.queue_observation(format!("I said: {reply}"));
            } else {
                seat.brain
                    .lock()
                    .await
                    .queue_observation(format!("{speaker_name} said: {reply}"));
                self.incoming
                    .get_mut(&seat.id)
                    .ok_or_else(|| unknown(&seat.id))?
                    .push_back(reply.to_string());
            }
        }
        Ok(())
    }

    /// Every committed `(speaker id, reply)` so far.
    #[must_use]
    pub fn transcript(&self) -> Vec<(String, String)> {
        self.transcript.lock().clone()
    }

    /// Lock one agent's brain, e.g. to inspect its memory.
    ///
    /// # Errors
    /// [`ReverieError::UnknownAgent`].
    pub async fn brain(&self, id: &str) -> Result<tokio::sync::MutexGuard<'_, AgentBrain>> {
        Ok(self.seat(id)?.brain.lock().await)
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Run the next speaker's tick at `now` and deliver whatever it says.
    ///
    /// A failing tick never ends the session: it is logged and the speaker
    /// uses the fallback utterance, or stays silent without one.
    ///
    /// # Errors
    /// Only bookkeeping errors, which indicate a bug.
    pub async fn run_turn(&self, now: Timestamp) -> Result<TurnRecord> {
        let turn = self.turn_index.load(Ordering::SeqCst);
        let speaker = self.next_speaker();
        let incoming = self.consume_incoming_partner_utterance(&speaker)?;
        let dialogue_history = self.dialogue_context_for(&speaker)?;
        let observed_entities = self
            .seats
            .iter()
            .filter(|s| s.id != speaker)
            .map(|s| s.name.clone())
            .collect();

        let input = TickInput {
            now,
            world_context: self.world_context.clone(),
            observed_entities,
            observed_events: Vec::new(),
            dialogue_history,
        };

        let (reply, reflections) = {
            let mut brain = self.seat(&speaker)?.brain.lock().await;
            match brain.tick(input).await {
                Ok(outcome) => (
                    outcome.utterance().map(str::to_string),
                    outcome.reflections.len(),
                ),
                Err(e) => {
                    warn!(agent = %speaker, turn, error = %e, "Tick failed");
                    (self.fallback_utterance.clone(), 0)
                }
            }
        };

        if let Some(reply) = &reply {
            self.commit_speaker_reply(&speaker, incoming.as_deref(), reply)?;
            self.broadcast_reply(&speaker, reply).await?;
            info!(agent = %speaker, turn, "Turn: {reply}");
        } else {
            debug!(agent = %speaker, turn, "Turn: silent");
        }

        Ok(TurnRecord {
            turn,
            speaker,
            utterance: reply,
            reflections,
        })
    }

    /// Run `turns` turns, the first at `start` and each later one `step`
    /// after the previous.
    ///
    /// # Errors
    /// See [`ConversationSession::run_turn`].
    pub async fn run(
        &self,
        turns: usize,
        start: Timestamp,
        step: Duration,
    ) -> Result<Vec<TurnRecord>> {
        let mut records = Vec::with_capacity(turns);
        let mut now = start;
        for _ in 0..turns {
            records.push(self.run_turn(now).await?);
            now += step;
        }
        Ok(records)
    }

    fn seat(&self, id: &str) -> Result<&Seat> {
        self.seats
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| unknown(id))
    }
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("agents", &self.agent_ids())
            .field("turn_index", &self.turn_index.load(Ordering::SeqCst))
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

fn unknown(id: &str) -> ReverieError {
    ReverieError::UnknownAgent(id.to_string())
}
