use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use super::merge::{Conflict, MergeEngine, MergeResult};
use crate::quotes::QuoteStore;

/// Which side of a conflict should survive the review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Choice {
    /// Keep the category the merge already applied.
    #[default]
    Remote,
    /// Restore the category the quote had before the merge.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ReviewPhase {
    Idle,
    AwaitingChoice,
    Applied,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("no conflict review is in progress")]
    NotReviewing,
    #[error("conflict #{index} does not exist ({count} pending)")]
    NoSuchConflict { index: usize, count: usize },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub reverted: usize,
    pub reinserted: usize,
    pub kept_remote: usize,
}

/// Manual override of remote-wins merge outcomes.
///
/// Holds at most one pending [`MergeResult`]. Choices are collected while
/// awaiting and committed together by [`ConflictReview::apply`]; there is no
/// per-item commit. Dismissing simply accepts what the merge already did.
#[derive(Debug)]
pub struct ConflictReview {
    phase: ReviewPhase,
    pending: Option<MergeResult>,
    choices: Vec<Choice>,
}

impl Default for ConflictReview {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictReview {
    pub fn new() -> Self {
        Self {
            phase: ReviewPhase::Idle,
            pending: None,
            choices: Vec::new(),
        }
    }

    pub fn with_pending(result: Option<MergeResult>) -> Self {
        let mut review = Self::new();
        if let Some(result) = result {
            review.offer(result);
        }
        review
    }

    pub fn phase(&self) -> ReviewPhase {
        self.phase
    }

    pub fn pending(&self) -> Option<&MergeResult> {
        self.pending.as_ref()
    }

    /// Retains `result` as the one awaiting review, replacing any older result.
    pub fn offer(&mut self, result: MergeResult) {
        if self.phase == ReviewPhase::AwaitingChoice {
            tracing::info!("newer merge result replaced an unfinished conflict review");
        }
        self.phase = ReviewPhase::Idle;
        self.choices.clear();
        self.pending = Some(result);
    }

    /// Starts the review; returns `false` when there is nothing to decide.
    pub fn begin(&mut self) -> bool {
        let count = match &self.pending {
            Some(result) if result.has_conflicts() => result.conflicts.len(),
            _ => return false,
        };
        self.choices = vec![Choice::default(); count];
        self.phase = ReviewPhase::AwaitingChoice;
        tracing::debug!(conflicts = count, "conflict review started");
        true
    }

    pub fn conflicts(&self) -> &[Conflict] {
        self.pending
            .as_ref()
            .map(|result| result.conflicts.as_slice())
            .unwrap_or_default()
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn choose(&mut self, index: usize, choice: Choice) -> Result<(), ReviewError> {
        if self.phase != ReviewPhase::AwaitingChoice {
            return Err(ReviewError::NotReviewing);
        }
        let count = self.choices.len();
        let slot = self
            .choices
            .get_mut(index)
            .ok_or(ReviewError::NoSuchConflict { index, count })?;
        *slot = choice;
        Ok(())
    }

    /// Commits every pending choice at once and returns to idle.
    pub fn apply(
        &mut self,
        store: &mut QuoteStore,
        engine: &MergeEngine,
    ) -> Result<ResolutionReport, ReviewError> {
        if self.phase != ReviewPhase::AwaitingChoice {
            return Err(ReviewError::NotReviewing);
        }
        let result = self.pending.take().ok_or(ReviewError::NotReviewing)?;
        let choices = std::mem::take(&mut self.choices);
        self.phase = ReviewPhase::Applied;

        let mut report = ResolutionReport::default();
        let outcome = store.edit(|quotes| {
            for (conflict, choice) in result.conflicts.iter().zip(&choices) {
                if *choice == Choice::Remote {
                    report.kept_remote += 1;
                    continue;
                }
                let key = engine.key(&conflict.local_before);
                match quotes.iter().rposition(|quote| engine.key(quote) == key) {
                    Some(idx) => {
                        quotes[idx].category = conflict.local_before.category.clone();
                        report.reverted += 1;
                    }
                    None => {
                        quotes.push(conflict.local_before.clone());
                        report.reinserted += 1;
                    }
                }
            }
        });
        self.phase = ReviewPhase::Idle;
        outcome?;

        tracing::info!(
            reverted = report.reverted,
            reinserted = report.reinserted,
            kept_remote = report.kept_remote,
            "conflict review applied"
        );
        Ok(report)
    }

    /// Drops the pending result, accepting every remote-wins outcome.
    pub fn dismiss(&mut self) -> Option<MergeResult> {
        self.phase = ReviewPhase::Idle;
        self.choices.clear();
        self.pending.take()
    }
}
