/// Orchestrator phase definitions
///
/// A run moves through these phases; `Completed` and `Aborted` are terminal.
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// State is being loaded or created
    Initializing,

    /// A listing page is being fetched
    FetchingList,

    /// Items of the current listing page are being fetched
    FetchingDetail,

    /// State is being written to the store
    Checkpointing,

    // ===== Terminal Phases =====
    /// The run finished; its state is marked completed
    Completed,

    /// The run stopped early; the last checkpoint is the resume point
    Aborted,
}

impl CrawlPhase {
    /// Returns true if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if the orchestrator may move from `self` to `next`
    ///
    /// Staying in the same phase is always allowed for active phases. Any
    /// active phase may abort.
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;

        if self.is_terminal() {
            return false;
        }
        if *self == next || next == Aborted {
            return true;
        }

        matches!(
            (self, next),
            (Initializing, FetchingList)
                | (Initializing, Checkpointing)
                | (Initializing, Completed)
                | (FetchingList, FetchingDetail)
                | (FetchingList, Checkpointing)
                | (FetchingDetail, Checkpointing)
                | (Checkpointing, FetchingList)
                | (Checkpointing, Completed)
        )
    }

    /// Lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::FetchingList => "fetching_list",
            Self::FetchingDetail => "fetching_detail",
            Self::Checkpointing => "checkpointing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
