// SPDX-License-Identifier: MIT OR Apache-2.0
//! Carrying the rows named by a queued notification forward to the source's
//! current rows.
//!
//! A source queues notifications as it is edited, but the model applies them
//! later, after the source may have moved on. Each notification is applied in
//! order against the registry, and whenever the model needs to read a row it
//! maps the row through the notifications queued after it.

use crate::source::SourceNotification;

/// A row position: parent top-level row (`None` for node rows) and row
pub(crate) type RowPath = (Option<usize>, usize);

/// The notifications queued after the one being applied
#[derive(Debug, Clone, Copy)]
pub(crate) struct Later<'a> {
    notifications: &'a [SourceNotification],
}

impl<'a> Later<'a> {
    pub(crate) fn new(notifications: &'a [SourceNotification]) -> Self {
        Self { notifications }
    }

    /// Whether any later notification moves rows around
    pub(crate) fn is_structural(&self) -> bool {
        self.notifications
            .iter()
            .any(|n| !matches!(n, SourceNotification::ValueChanged { .. }))
    }

    /// Where a row now lives, or `None` if a later notification removed it
    /// (or its parent).
    pub(crate) fn carry(&self, (mut parent, mut row): RowPath) -> Option<RowPath> {
        for notification in self.notifications {
            match *notification {
                SourceNotification::RowsInserted { parent: None, first, last } => {
                    let at = parent.as_mut().unwrap_or(&mut row);
                    shift_for_insert(at, first, last);
                }
                SourceNotification::RowsRemoved { parent: None, first, last } => {
                    let at = parent.as_mut().unwrap_or(&mut row);
                    if !shift_for_remove(at, first, last) {
                        return None;
                    }
                }
                SourceNotification::RowsInserted {
                    parent: Some(owner),
                    first,
                    last,
                } if parent == Some(owner) => shift_for_insert(&mut row, first, last),
                SourceNotification::RowsRemoved {
                    parent: Some(owner),
                    first,
                    last,
                } if parent == Some(owner) => {
                    if !shift_for_remove(&mut row, first, last) {
                        return None;
                    }
                }
                _ => {}
            }
        }
        Some((parent, row))
    }

    /// Number of children a node row had before the later notifications ran,
    /// given how many it has now. `None` if the node was removed later.
    pub(crate) fn children_before(&self, mut node: usize, now: impl FnOnce(usize) -> usize) -> Option<usize> {
        let (mut inserted, mut removed) = (0usize, 0usize);
        for notification in self.notifications {
            match *notification {
                SourceNotification::RowsInserted { parent: None, first, last } => {
                    shift_for_insert(&mut node, first, last);
                }
                SourceNotification::RowsRemoved { parent: None, first, last } => {
                    if !shift_for_remove(&mut node, first, last) {
                        return None;
                    }
                }
                SourceNotification::RowsInserted {
                    parent: Some(owner),
                    first,
                    last,
                } if owner == node && last >= first => inserted += last + 1 - first,
                SourceNotification::RowsRemoved {
                    parent: Some(owner),
                    first,
                    last,
                } if owner == node && last >= first => removed += last + 1 - first,
                _ => {}
            }
        }
        Some((now(node) + removed).saturating_sub(inserted))
    }

    /// Changed rows `first..=last` under `parent`, carried forward and split
    /// into contiguous runs.
    pub(crate) fn carry_range(&self, parent: Option<usize>, first: usize, last: usize) -> Vec<(Option<usize>, usize, usize)> {
        if last < first {
            return Vec::new();
        }
        if !self.is_structural() {
            return vec![(parent, first, last)];
        }

        let mut runs: Vec<(Option<usize>, usize, usize)> = Vec::new();
        for row in first..=last {
            let Some((parent, row)) = self.carry((parent, row)) else {
                continue;
            };
            match runs.last_mut() {
                Some((p, _, end)) if *p == parent && *end + 1 == row => *end = row,
                _ => runs.push((parent, row, row)),
            }
        }
        runs
    }
}

fn shift_for_insert(at: &mut usize, first: usize, last: usize) {
    if last >= first && *at >= first {
        *at += last + 1 - first;
    }
}

// Returns false when `at` itself was removed.
fn shift_for_remove(at: &mut usize, first: usize, last: usize) -> bool {
    if last < first || *at < first {
        return true;
    }
    if *at <= last {
        return false;
    }
    *at -= last + 1 - first;
    true
}
