//! Per-tag sync state machine, outcomes and the run report
//!
//! Each tag goes through `Listing -> Diffing -> Materializing` once per page
//! and ends in `Done` (natural end of pages) or `Failed` (tag-level error).

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{DomainError, SyncError};
use super::newtypes::{PostId, Tag};
use super::tag_request::{SyncPolicy, TagRequest};

// ============================================================================
// TagSyncState
// ============================================================================

/// State of one tag's sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSyncState {
    /// Pulling the next page from the listing
    Listing,
    /// Comparing a page against the archive index
    Diffing,
    /// Fetching and writing the posts that need it
    Materializing,
    /// Natural end of pages reached
    Done,
    /// Aborted by a tag-level error
    Failed,
}

impl TagSyncState {
    /// Returns true for `Done` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, TagSyncState::Done | TagSyncState::Failed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: TagSyncState) -> bool {
        use TagSyncState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Listing, Diffing) | (Listing, Done) => true,
            (Diffing, Materializing) | (Diffing, Listing) => true,
            (Materializing, Listing) => true,
            _ => false,
        }
    }

    /// Moves to `next`, rejecting illegal transitions
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidState`] when the transition is not allowed
    pub fn transition_to(&mut self, next: TagSyncState) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidState {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl Display for TagSyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagSyncState::Listing => "Listing",
            TagSyncState::Diffing => "Diffing",
            TagSyncState::Materializing => "Materializing",
            TagSyncState::Done => "Done",
            TagSyncState::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// TagOutcome
// ============================================================================

/// A post that could not be materialized during a tag's sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFailure {
    pub post_id: PostId,
    pub error: SyncError,
}

/// Summary of one tag's sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOutcome {
    pub tag: Tag,
    pub policy: SyncPolicy,
    /// Final state, `Done` or `Failed`
    pub state: TagSyncState,
    /// Tag-level error when `state` is `Failed`
    pub error: Option<SyncError>,
    /// Listing pages fetched (including the terminating empty page)
    pub pages: u32,
    /// Posts returned by the listing
    pub listed: u64,
    /// Posts already synced and skipped without fetching
    pub skipped: u64,
    /// Posts written to the archive (new or changed)
    pub materialized: u64,
    /// Posts whose missing asset was fetched after a policy upgrade
    pub upgraded: u64,
    /// Posts without a downloadable asset, skipped under the full policy
    pub unavailable: u64,
    /// Posts with a forbidden file extension
    pub forbidden: u64,
    /// Post-level failures; the tag carried on past each of them
    pub failures: Vec<PostFailure>,
}

impl TagOutcome {
    /// Fresh outcome for a request, in the `Listing` state
    pub fn new(request: &TagRequest) -> Self {
        Self {
            tag: request.tag.clone(),
            policy: request.policy,
            state: TagSyncState::Listing,
            error: None,
            pages: 0,
            listed: 0,
            skipped: 0,
            materialized: 0,
            upgraded: 0,
            unavailable: 0,
            forbidden: 0,
            failures: Vec::new(),
        }
    }

    /// Returns true if the tag finished without a tag-level error
    pub fn is_success(&self) -> bool {
        self.state == TagSyncState::Done
    }

    /// Records a post-level failure
    pub fn record_failure(&mut self, post_id: PostId, error: SyncError) {
        self.failures.push(PostFailure { post_id, error });
    }

    /// Moves to `Failed`, keeping the error
    pub fn fail(&mut self, error: SyncError) {
        self.state = TagSyncState::Failed;
        self.error = Some(error);
    }
}

// ============================================================================
// SyncReport
// ============================================================================

/// Summary of one sync run over a set of tag requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// One outcome per request, in request order
    pub outcomes: Vec<TagOutcome>,
}

impl SyncReport {
    /// Starts an empty report with a fresh run ID
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_ms: 0,
            outcomes: Vec::new(),
        }
    }

    /// Outcomes of tags that ended in `Failed`
    pub fn failed_tags(&self) -> impl Iterator<Item = &TagOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Returns true if any tag failed or any post failed
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| !o.is_success() || !o.failures.is_empty())
    }

    /// Total number of posts materialized across tags
    pub fn total_materialized(&self) -> u64 {
        self.outcomes.iter().map(|o| o.materialized).sum()
    }

    /// Total number of post-level failures across tags
    pub fn total_post_failures(&self) -> usize {
        self.outcomes.iter().map(|o| o.failures.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = TagSyncState::Listing;
        state.transition_to(TagSyncState::Diffing).unwrap();
        state.transition_to(TagSyncState::Materializing).unwrap();
        state.transition_to(TagSyncState::Listing).unwrap();
        state.transition_to(TagSyncState::Diffing).unwrap();
        state.transition_to(TagSyncState::Listing).unwrap();
        state.transition_to(TagSyncState::Done).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failed_reachable_from_any_live_state() {
        for start in [
            TagSyncState::Listing,
            TagSyncState::Diffing,
            TagSyncState::Materializing,
        ] {
            let mut state = start;
            assert!(state.transition_to(TagSyncState::Failed).is_ok());
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut done = TagSyncState::Done;
        assert!(done.transition_to(TagSyncState::Listing).is_err());
        let mut failed = TagSyncState::Failed;
        assert!(failed.transition_to(TagSyncState::Done).is_err());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut state = TagSyncState::Listing;
        let err = state.transition_to(TagSyncState::Materializing).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidState {
                from: "Listing".into(),
                to: "Materializing".into()
            }
        );
        assert_eq!(state, TagSyncState::Listing);
    }

    #[test]
    fn test_report_failure_accounting() {
        let request = TagRequest::parse("arknights").unwrap();
        let mut ok = TagOutcome::new(&request);
        ok.state = TagSyncState::Done;
        ok.materialized = 3;

        let mut partial = TagOutcome::new(&request);
        partial.state = TagSyncState::Done;
        partial.materialized = 9;
        partial.record_failure(
            PostId::new(5),
            SyncError::Download {
                post_id: 5,
                reason: "HTTP 500".into(),
            },
        );

        let mut report = SyncReport::start();
        report.outcomes = vec![ok.clone()];
        assert!(!report.has_failures());

        report.outcomes.push(partial);
        assert!(report.has_failures());
        assert_eq!(report.failed_tags().count(), 0);
        assert_eq!(report.total_materialized(), 12);
        assert_eq!(report.total_post_failures(), 1);

        let mut failed = TagOutcome::new(&request);
        failed.fail(SyncError::Cancelled);
        report.outcomes.push(failed);
        assert_eq!(report.failed_tags().count(), 1);
    }
}
