//! Per-session message listing.

use crate::worker::{Action, DirectoryInfo, MessageId, SortCriterion};

/// Message ids of the opened directory, in the order the backend listed
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStore {
    info: DirectoryInfo,
    sort: Vec<SortCriterion>,
    ids: Vec<MessageId>,
}

impl MessageStore {
    /// Creates a store for a directory, listed in `sort` order.
    #[must_use]
    pub const fn new(info: DirectoryInfo, sort: Vec<SortCriterion>) -> Self {
        Self {
            info,
            sort,
            ids: Vec::new(),
        }
    }

    /// Creates a store listing newest arrivals first.
    #[must_use]
    pub fn newest_first(info: DirectoryInfo) -> Self {
        Self::new(info, vec![SortCriterion::NEWEST_FIRST])
    }

    /// Replaces the directory summary.
    pub fn apply_info(&mut self, info: DirectoryInfo) {
        self.info = info;
    }

    /// Replaces the listing.
    pub fn update_contents(&mut self, ids: Vec<MessageId>) {
        self.ids = ids;
    }

    /// Latest directory summary.
    #[must_use]
    pub const fn info(&self) -> &DirectoryInfo {
        &self.info
    }

    /// Known message ids.
    #[must_use]
    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    /// Action that lists the directory in this store's order.
    #[must_use]
    pub fn contents_request(&self) -> Action {
        Action::FetchDirectoryContents {
            sort: self.sort.clone(),
        }
    }

    /// Action that fetches headers for every known message.
    #[must_use]
    pub fn headers_request(&self) -> Action {
        Action::FetchMessageHeaders(self.ids.clone())
    }
}
