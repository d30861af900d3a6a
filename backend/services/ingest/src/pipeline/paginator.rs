use chrono::{DateTime, Utc};

use crate::hubspot::query::{modified_range_filter, FilterSpec};

/// Pagination state for one entity-type pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub after: u32,
    /// Tightened lower bound set after an offset overflow.
    pub last_modified_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next(Cursor),
    Completed,
}

/// Builds search windows and advances the cursor across pages.
///
/// The search API refuses offsets at or beyond `overflow_threshold`. When a
/// page reports such an offset, enumeration restarts at `after = 0` with the
/// lower bound raised to the page's latest `updatedAt`; ascending sort keeps
/// the restarted result set bounded.
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    property_name: &'static str,
    overflow_threshold: u32,
}

impl CursorPaginator {
    pub fn new(property_name: &'static str, overflow_threshold: u32) -> Self {
        Self {
            property_name,
            overflow_threshold,
        }
    }

    pub fn property_name(&self) -> &'static str {
        self.property_name
    }

    /// Filter for `[cursor.last_modified_date ?? last_pulled, now]`.
    pub fn next_filter(
        &self,
        cursor: &Cursor,
        last_pulled: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> FilterSpec {
        let lower = cursor.last_modified_date.or(last_pulled);
        modified_range_filter(self.property_name, lower, now)
    }

    /// `next_after` is the page's reported offset; `max_updated_at` the
    /// latest `updatedAt` among the page's records. An overflow that cannot
    /// raise the lower bound (empty page, or no record newer than the current
    /// bound) completes the pass instead of re-requesting the same window.
    pub fn advance(
        &self,
        cursor: &Cursor,
        next_after: Option<u32>,
        max_updated_at: Option<DateTime<Utc>>,
    ) -> Advance {
        let after = match next_after {
            Some(after) if after > 0 => after,
            _ => return Advance::Completed,
        };

        if after >= self.overflow_threshold {
            let bound = match max_updated_at {
                Some(max) if cursor.last_modified_date.map_or(true, |prev| max > prev) => max,
                _ => {
                    tracing::warn!(
                        after,
                        threshold = self.overflow_threshold,
                        "pagination offset overflow without a later updatedAt, stopping pass"
                    );
                    return Advance::Completed;
                }
            };
            tracing::debug!(
                after,
                threshold = self.overflow_threshold,
                "pagination offset overflow, restarting from last modified date"
            );
            return Advance::Next(Cursor {
                after: 0,
                last_modified_date: Some(bound),
            });
        }

        Advance::Next(Cursor {
            after,
            last_modified_date: cursor.last_modified_date,
        })
    }
}
