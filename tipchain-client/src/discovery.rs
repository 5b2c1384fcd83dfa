//! Profile Discovery
//!
//! Browses the registry's profile listing:
//! 1. Cursor pages - fetched from the registry by username order and
//!    accumulated locally
//! 2. Search - a filter over what has been accumulated, never a new query
//! 3. Pages - fixed-size pages over the filtered list, with a compact
//!    window of page links

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{Profile, RegistryGateway};

/// Profiles requested from the registry per fetch
pub const DEFAULT_FETCH_SIZE: u32 = 50;

/// Profiles shown per page
pub const DEFAULT_PAGE_SIZE: usize = 9;

/// One entry in the page link window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSlot {
    Page(usize),
    Ellipsis,
}

/// Page links to render for `current` of `total` pages.
///
/// Always shows the first and last page, the current page and one page on
/// each side of it. Any longer gap collapses into a single ellipsis.
pub fn page_window(current: usize, total: usize) -> Vec<PageSlot> {
    if total == 0 {
        return Vec::new();
    }
    let current = current.clamp(1, total);

    let mut slots = Vec::new();
    let mut last_shown = 0;
    for page in 1..=total {
        let shown = page == 1 || page == total || page.abs_diff(current) <= 1;
        if !shown {
            continue;
        }
        if last_shown != 0 && page - last_shown > 1 {
            slots.push(PageSlot::Ellipsis);
        }
        slots.push(PageSlot::Page(page));
        last_shown = page;
    }
    slots
}

/// Case-insensitive match over username, display name and bio
fn matches_query(profile: &Profile, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    profile.username.to_lowercase().contains(query)
        || profile.display_name.to_lowercase().contains(query)
        || profile
            .bio
            .as_deref()
            .map(|bio| bio.to_lowercase().contains(query))
            .unwrap_or(false)
}

/// Accumulated, searchable, paged profile listing
pub struct DiscoveryFeed {
    registry: RegistryGateway,
    fetch_size: u32,
    per_page: usize,
    profiles: Vec<Profile>,
    cursor: Option<String>,
    has_more: bool,
    query: String,
    page: usize,
    notice: Option<String>,
}

impl DiscoveryFeed {
    pub fn new(registry: RegistryGateway, fetch_size: u32, per_page: usize) -> Self {
        Self {
            registry,
            fetch_size: fetch_size.max(1),
            per_page: per_page.max(1),
            profiles: Vec::new(),
            cursor: None,
            has_more: true,
            query: String::new(),
            page: 1,
            notice: None,
        }
    }

    /// Every profile loaded so far, in registry order
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Username the next fetch starts after
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Whether the registry may hold more profiles. A full page is taken
    /// to mean there are more, since the registry reports no total.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Non-fatal notice from the last failed fetch
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Fetch up to `page_size` profiles after `cursor` and append them.
    /// A failed fetch keeps what is already loaded and sets a notice.
    pub async fn load_page(&mut self, cursor: Option<String>, page_size: u32) -> Result<usize> {
        debug!(
            "Loading {} profiles after {:?}",
            page_size,
            cursor.as_deref()
        );

        let batch = match self
            .registry
            .list_profiles(page_size, cursor.as_deref())
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Failed to load profiles: {}", e);
                self.notice = Some(format!("Could not load more profiles: {}", e));
                return Err(e);
            }
        };

        let count = batch.len();
        self.has_more = count == page_size as usize;
        if let Some(last) = batch.last() {
            self.cursor = Some(last.username.clone());
        }
        self.profiles.extend(batch);
        self.notice = None;

        info!(
            "Loaded {} profiles ({} total, more: {})",
            count,
            self.profiles.len(),
            self.has_more
        );
        Ok(count)
    }

    /// Fetch the next batch after the last-seen username
    pub async fn load_more(&mut self) -> Result<usize> {
        let cursor = self.cursor.clone();
        self.load_page(cursor, self.fetch_size).await
    }

    /// Drop everything loaded and start a fresh listing
    pub fn reset(&mut self) {
        self.profiles.clear();
        self.cursor = None;
        self.has_more = true;
        self.query.clear();
        self.page = 1;
        self.notice = None;
    }

    /// Filter the loaded profiles. A changed query returns to page 1.
    pub fn search(&mut self, query: &str) {
        let query = query.trim().to_lowercase();
        if query != self.query {
            self.query = query;
            self.page = 1;
        }
    }

    /// Loaded profiles matching the current query
    pub fn filtered(&self) -> Vec<&Profile> {
        self.profiles
            .iter()
            .filter(|p| matches_query(p, &self.query))
            .collect()
    }

    pub fn total_pages(&self) -> usize {
        self.filtered().len().div_ceil(self.per_page)
    }

    /// Profiles on the current page
    pub fn current_page_profiles(&self) -> Vec<&Profile> {
        self.filtered()
            .into_iter()
            .skip((self.page - 1) * self.per_page)
            .take(self.per_page)
            .collect()
    }

    pub fn page_window(&self) -> Vec<PageSlot> {
        page_window(self.page, self.total_pages())
    }

    /// Move to `page`. Reaching the last page fetches the next batch when
    /// the registry may have more; a failed fetch only sets the notice.
    pub async fn go_to_page(&mut self, page: usize) {
        let total = self.total_pages().max(1);
        self.page = page.clamp(1, total);

        if self.page == total && self.has_more {
            // Failure is recorded as the notice
            let _ = self.load_more().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PageSlot::{Ellipsis, Page};

    #[test]
    fn test_page_window_middle() {
        assert_eq!(
            page_window(5, 10),
            vec![Page(1), Ellipsis, Page(4), Page(5), Page(6), Ellipsis, Page(10)]
        );
    }

    #[test]
    fn test_page_window_edges() {
        assert_eq!(page_window(1, 1), vec![Page(1)]);
        assert_eq!(page_window(1, 3), vec![Page(1), Page(2), Page(3)]);
        assert_eq!(
            page_window(1, 10),
            vec![Page(1), Page(2), Ellipsis, Page(10)]
        );
        assert_eq!(
            page_window(10, 10),
            vec![Page(1), Ellipsis, Page(9), Page(10)]
        );
        // A gap of exactly one page is still a gap
        assert_eq!(
            page_window(4, 5),
            vec![Page(1), Ellipsis, Page(3), Page(4), Page(5)]
        );
        assert!(page_window(1, 0).is_empty());
    }
}
