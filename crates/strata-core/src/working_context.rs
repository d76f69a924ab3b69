//! Working context: the compressed per-session state carried turn to turn.
//!
//! The context is a pure fold over ledger entries. Each entry type has one
//! update rule, applied in sequence order; entries at or below
//! `last_applied_seq` are skipped so replay is idempotent. Reasoning never
//! enters the context, only conclusions do.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use strata_state::{ArtifactStatus, EntryType, LedgerEntry, PublishTarget, SessionId};
use tracing::warn;

/// Status of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: StepStatus::Pending,
            outcome: None,
        }
    }
}

/// A decision or constraint conclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    pub sequence_num: u64,
    pub scope: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_id: String,
    pub title: String,
    pub status: ArtifactStatus,
    pub target: PublishTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQuestion {
    pub id: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Entry `detail` payloads
// ---------------------------------------------------------------------------

/// `detail` of a plan-created entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDetail {
    pub steps: Vec<PlanStep>,
}

/// `detail` of a plan-updated entry: either a full replacement or a patch of
/// one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanUpdateDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<PlanStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// `detail` of a child-agent-result entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildResultDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
}

/// `detail` of artifact-created / artifact-updated entries.
pub type ArtifactDetail = ArtifactRef;

/// `detail` of a user-clarification entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationDetail {
    pub question_id: String,
}

/// `detail` of a context-injection entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<OpenQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_knowledge: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// WorkingContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingContext {
    pub session_id: SessionId,
    pub intent_summary: String,
    pub plan: Vec<PlanStep>,
    pub active_decisions: Vec<ContextItem>,
    pub active_constraints: Vec<ContextItem>,
    pub artifact_refs: Vec<ArtifactRef>,
    pub open_questions: Vec<OpenQuestion>,
    pub prior_knowledge: Vec<String>,
    pub turn_count: u64,
    pub last_checkpoint_seq: u64,
    pub last_applied_seq: u64,
}

impl WorkingContext {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            intent_summary: String::new(),
            plan: Vec::new(),
            active_decisions: Vec::new(),
            active_constraints: Vec::new(),
            artifact_refs: Vec::new(),
            open_questions: Vec::new(),
            prior_knowledge: Vec::new(),
            turn_count: 0,
            last_checkpoint_seq: 0,
            last_applied_seq: 0,
        }
    }

    /// Fold `entries` (any order) into a fresh context.
    pub fn replay<'a>(
        session_id: SessionId,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Self {
        let mut ctx = Self::new(session_id);
        ctx.apply_all(entries);
        ctx
    }

    /// Apply entries in sequence order. Returns how many were applied.
    pub fn apply_all<'a>(&mut self, entries: impl IntoIterator<Item = &'a LedgerEntry>) -> usize {
        let mut sorted: Vec<&LedgerEntry> = entries.into_iter().collect();
        sorted.sort_by_key(|e| e.sequence_num);
        sorted.into_iter().filter(|e| self.apply(e)).count()
    }

    /// Apply one entry. Returns `false` when it was already folded in.
    pub fn apply(&mut self, entry: &LedgerEntry) -> bool {
        if entry.sequence_num <= self.last_applied_seq {
            return false;
        }

        match entry.entry_type {
            EntryType::Decision => self.active_decisions.push(item(entry)),
            EntryType::Constraint => self.active_constraints.push(item(entry)),
            EntryType::PlanCreated => {
                if let Some(detail) = detail::<PlanDetail>(entry) {
                    self.plan = detail.steps;
                }
            }
            EntryType::PlanUpdated => {
                if let Some(detail) = detail::<PlanUpdateDetail>(entry) {
                    self.apply_plan_update(detail);
                }
            }
            EntryType::ChildAgentResult => {
                let detail = detail::<ChildResultDetail>(entry).unwrap_or_default();
                if let Some(step_id) = detail.step_id {
                    if let Some(step) = self.step_mut(&step_id) {
                        step.outcome = Some(entry.summary.clone());
                        step.status = detail.status.unwrap_or(StepStatus::Completed);
                    }
                }
            }
            EntryType::ArtifactCreated | EntryType::ArtifactUpdated => {
                if let Some(artifact) = detail::<ArtifactDetail>(entry) {
                    self.upsert_artifact(artifact);
                }
            }
            EntryType::UserClarification => {
                if let Some(detail) = detail::<ClarificationDetail>(entry) {
                    self.open_questions.retain(|q| q.id != detail.question_id);
                }
            }
            EntryType::ContextInjection => {
                if let Some(detail) = detail::<InjectionDetail>(entry) {
                    self.apply_injection(detail);
                }
            }
            EntryType::ResearchFinding => {}
            EntryType::Checkpoint => self.last_checkpoint_seq = entry.sequence_num,
        }

        self.last_applied_seq = entry.sequence_num;
        self.turn_count = self.turn_count.max(entry.turn);
        true
    }

    fn apply_plan_update(&mut self, detail: PlanUpdateDetail) {
        if let Some(steps) = detail.steps {
            self.plan = steps;
            return;
        }
        let Some(step_id) = detail.step_id else {
            return;
        };
        if let Some(step) = self.step_mut(&step_id) {
            if let Some(status) = detail.status {
                step.status = status;
            }
            if detail.outcome.is_some() {
                step.outcome = detail.outcome;
            }
        }
    }

    fn apply_injection(&mut self, detail: InjectionDetail) {
        if let Some(intent) = detail.intent {
            self.intent_summary = intent;
        }
        if let Some(question) = detail.question {
            self.open_questions.retain(|q| q.id != question.id);
            self.open_questions.push(question);
        }
        if let Some(prior) = detail.prior_knowledge {
            self.prior_knowledge = prior;
        }
    }

    fn upsert_artifact(&mut self, artifact: ArtifactRef) {
        match self
            .artifact_refs
            .iter_mut()
            .find(|a| a.artifact_id == artifact.artifact_id)
        {
            Some(existing) => *existing = artifact,
            None => self.artifact_refs.push(artifact),
        }
    }

    fn step_mut(&mut self, step_id: &str) -> Option<&mut PlanStep> {
        self.plan.iter_mut().find(|s| s.id == step_id)
    }

    /// Compact text block for the orchestrator prompt.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let intent = if self.intent_summary.is_empty() {
            "(none)"
        } else {
            &self.intent_summary
        };
        let _ = writeln!(out, "Intent: {intent}");
        let _ = writeln!(out, "Turn: {}", self.turn_count);

        if !self.plan.is_empty() {
            out.push_str("Plan:\n");
            for step in &self.plan {
                let _ = write!(
                    out,
                    "  - [{}] {}: {}",
                    step.status.as_str(),
                    step.id,
                    step.description
                );
                if let Some(outcome) = &step.outcome {
                    let _ = write!(out, " => {outcome}");
                }
                out.push('\n');
            }
        }
        render_items(&mut out, "Decisions", &self.active_decisions);
        render_items(&mut out, "Constraints", &self.active_constraints);

        if !self.artifact_refs.is_empty() {
            out.push_str("Artifacts:\n");
            for a in &self.artifact_refs {
                let _ = writeln!(
                    out,
                    "  - {} ({}, {}) -> {}",
                    a.title, a.artifact_id, a.status, a.target
                );
            }
        }
        if !self.open_questions.is_empty() {
            out.push_str("Open questions:\n");
            for q in &self.open_questions {
                let _ = writeln!(out, "  - {}: {}", q.id, q.text);
            }
        }
        if !self.prior_knowledge.is_empty() {
            out.push_str("Prior knowledge:\n");
            for k in &self.prior_knowledge {
                let _ = writeln!(out, "  - {k}");
            }
        }
        out
    }
}

fn render_items(out: &mut String, heading: &str, items: &[ContextItem]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{heading}:");
    for i in items {
        let _ = writeln!(out, "  - #{} [{}] {}", i.sequence_num, i.scope, i.summary);
    }
}

fn item(entry: &LedgerEntry) -> ContextItem {
    ContextItem {
        sequence_num: entry.sequence_num,
        scope: entry.scope.clone(),
        summary: entry.summary.clone(),
    }
}

fn detail<T: for<'de> Deserialize<'de>>(entry: &LedgerEntry) -> Option<T> {
    if entry.detail.is_null() {
        return None;
    }
    match serde_json::from_value(entry.detail.clone()) {
        Ok(detail) => Some(detail),
        Err(e) => {
            warn!(
                session_id = %entry.session_id,
                seq = entry.sequence_num,
                entry_type = %entry.entry_type,
                error = %e,
                "ignoring malformed entry detail"
            );
            None
        }
    }
}
