//! Reflection: salience accumulation and higher-order memory synthesis.
//!
//! Every stored observation adds its importance to a running counter. Once
//! the counter reaches the configured threshold the pipeline runs:
//!
//! 1. take the most recent `recent_window` records
//! 2. generate salient questions
//! 3. retrieve evidence per question
//! 4. synthesise insights
//! 5. link each insight to its evidence ids
//! 6. persist one reflection record per insight
//! 7. roll the counter over
//!
//! A failing stage degrades to an empty result and the run continues, so a
//! flaky model backend can never abort the agent's tick.

pub mod stages;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ReflectionConfig, RetrievalConfig};
use crate::embedding::EmbeddingEncoder;
use crate::error::Result;
use crate::importance::ReflectionContext;
use crate::memory::MemoryRecord;
use crate::service::MemoryService;
use crate::types::{MemoryId, Timestamp};

pub use stages::{
    rollover_policy, CarryOverExcess, CitationLinker, EmbeddingQuestionRetriever,
    EvidenceCitationLinker, InsightGenerator, QuestionEvidence, QuestionGenerator,
    QuestionRetriever, ResetToZero, RolloverPolicy, TemplateInsightGenerator,
    TemplateQuestionGenerator,
};

/// A synthesised insight together with the ids it claims as evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    /// Natural-language insight.
    pub text: String,
    /// Candidate citation ids; filtered against the log when stored.
    pub citation_ids: Vec<MemoryId>,
}

/// The four strategy objects a pipeline runs.
#[derive(Clone)]
pub struct ReflectionStages {
    /// Stage 2.
    pub questions: Arc<dyn QuestionGenerator>,
    /// Stage 3.
    pub retriever: Arc<dyn QuestionRetriever>,
    /// Stage 4.
    pub insights: Arc<dyn InsightGenerator>,
    /// Stage 5.
    pub linker: Arc<dyn CitationLinker>,
}

impl ReflectionStages {
    /// Model-free stages: template questions and insights, embedding-ranked
    /// evidence, word-overlap citations.
    #[must_use]
    pub fn heuristic(encoder: Arc<dyn EmbeddingEncoder>, retrieval: &RetrievalConfig) -> Self {
        Self {
            questions: Arc::new(TemplateQuestionGenerator),
            retriever: Arc::new(EmbeddingQuestionRetriever::new(
                encoder,
                retrieval.weights,
                retrieval.recency_decay,
            )),
            insights: Arc::new(TemplateInsightGenerator),
            linker: Arc::new(EvidenceCitationLinker),
        }
    }
}

/// Salience accumulator plus the staged synthesis run.
pub struct ReflectionPipeline {
    config: ReflectionConfig,
    stages: ReflectionStages,
    rollover: Box<dyn RolloverPolicy>,
    accumulated_importance: i64,
}

impl std::fmt::Debug for ReflectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectionPipeline")
            .field("config", &self.config)
            .field("accumulated_importance", &self.accumulated_importance)
            .finish_non_exhaustive()
    }
}

impl ReflectionPipeline {
    /// Create a pipeline whose rollover policy comes from `config.rollover`.
    #[must_use]
    pub fn new(config: ReflectionConfig, stages: ReflectionStages) -> Self {
        let rollover = rollover_policy(config.rollover, config.threshold);
        Self::with_rollover(config, stages, rollover)
    }

    /// Create a pipeline with an explicit rollover policy.
    #[must_use]
    pub fn with_rollover(
        config: ReflectionConfig,
        stages: ReflectionStages,
        rollover: Box<dyn RolloverPolicy>,
    ) -> Self {
        Self {
            config,
            stages,
            rollover,
            accumulated_importance: 0,
        }
    }

    /// Add an observation's importance to the counter. Negative values are
    /// accumulated as given.
    pub fn record_observation_importance(&mut self, importance: i64) {
        self.accumulated_importance = self.accumulated_importance.saturating_add(importance);
    }

    /// Whether the counter has reached the threshold.
    #[must_use]
    pub fn should_reflect(&self) -> bool {
        self.accumulated_importance >= self.config.threshold
    }

    /// Current counter value.
    #[must_use]
    pub fn accumulated_importance(&self) -> i64 {
        self.accumulated_importance
    }

    /// Pipeline sizing.
    #[must_use]
    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }

    /// Run all seven stages and return the reflections that were stored.
    ///
    /// Stage failures and timeouts are logged and treated as empty output.
    /// The rollover policy is applied even when nothing was produced.
    ///
    /// # Errors
    /// Only structural failures while storing a reflection propagate
    /// (for example an embedding dimension mismatch). Recoverable encoder
    /// failures skip the affected insight.
    pub async fn run_reflection(
        &mut self,
        memory: &mut MemoryService,
        now: Timestamp,
        context: &ReflectionContext,
    ) -> Result<Vec<MemoryRecord>> {
        let start = Instant::now();
        let timeout = memory.collaborator_timeout();
        let before = self.accumulated_importance;
        info!(
            agent = %context.agent_name,
            accumulated_importance = before,
            threshold = self.config.threshold,
            "Reflection triggered"
        );

        // 1. Recent window.
        let recent: Vec<MemoryRecord> =
            memory.log().most_recent(self.config.recent_window).to_vec();

        // 2. Questions.
        let questions = run_stage(
            "question generation",
            timeout,
            self.stages
                .questions
                .generate_questions(&recent, self.config.question_count, context),
        )
        .await;

        // 3. Evidence per question.
        let mut evidence = QuestionEvidence::new();
        for question in &questions {
            if evidence.get(question).is_some() {
                continue;
            }
            let records = run_stage(
                "question retrieval",
                timeout,
                self.stages.retriever.retrieve_for_question(
                    question,
                    &recent,
                    self.config.retrieval_top_k,
                ),
            )
            .await;
            evidence.insert(question.clone(), records);
        }

        // 4. Insights.
        let insights = run_stage(
            "insight generation",
            timeout,
            self.stages.insights.generate_insights(
                &questions,
                &evidence,
                self.config.insight_count,
                context,
            ),
        )
        .await;

        // 5. Citations, aligned by position; missing entries are empty.
        let citations = run_stage(
            "citation linking",
            timeout,
            self.stages.linker.link_citations(&insights, &evidence),
        )
        .await;

        // 6. Persist.
        let mut created = Vec::with_capacity(insights.len());
        for (idx, text) in insights.iter().enumerate() {
            let insight = Insight {
                text: text.clone(),
                citation_ids: citations.get(idx).cloned().unwrap_or_default(),
            };
            match memory.create_reflection(&insight, now, context, None).await {
                Ok(record) => created.push(record),
                Err(e) if e.is_recoverable() => {
                    warn!(agent = %context.agent_name, error = %e, "Skipping reflection");
                }
                Err(e) => return Err(e),
            }
        }

        // 7. Rollover.
        self.accumulated_importance = self.rollover.rollover(before);
        info!(
            agent = %context.agent_name,
            questions = questions.len(),
            reflections = created.len(),
            accumulated_importance = self.accumulated_importance,
            elapsed_us = start.elapsed().as_micros(),
            "Reflection complete"
        );
        Ok(created)
    }
}

async fn run_stage<T: Default>(
    stage: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> T {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(stage, error = %e, "Reflection stage failed, continuing with empty output");
            T::default()
        }
        Err(_) => {
            warn!(stage, timeout_ms = timeout.as_millis(), "Reflection stage timed out");
            T::default()
        }
    }
}
