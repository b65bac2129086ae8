use std::cmp::Ordering;
use std::ops::{Range, RangeInclusive};

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::format::parse_timestamp;
use super::history::WatchedEpisode;

pub(crate) const ITEMS_PER_PAGE_CHOICES: [usize; 5] = [5, 10, 25, 50, 100];
const PAGE_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortAxis {
    Name,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub(crate) fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub(crate) fn arrow(self) -> &'static str {
        match self {
            Self::Desc => "↑",
            Self::Asc => "↓",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SortSpec {
    pub(crate) axis: SortAxis,
    pub(crate) direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            axis: SortAxis::Date,
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    /// Flips the active axis; switching axes starts over at `Desc`.
    pub(crate) fn toggled(self, axis: SortAxis) -> Self {
        if self.axis == axis {
            Self {
                axis,
                direction: self.direction.flipped(),
            }
        } else {
            Self {
                axis,
                direction: SortDirection::Desc,
            }
        }
    }

    pub(crate) fn direction_for(self, axis: SortAxis) -> Option<SortDirection> {
        (self.axis == axis).then_some(self.direction)
    }
}

/// Sorted view over the history. The slice itself keeps insertion order.
pub(crate) fn sort_history(history: &[WatchedEpisode], spec: SortSpec) -> Vec<&WatchedEpisode> {
    let mut sorted: Vec<&WatchedEpisode> = history.iter().collect();
    match spec.axis {
        SortAxis::Date => {
            let mut keyed: Vec<_> = sorted
                .into_iter()
                .map(|episode| (parse_timestamp(&episode.date), episode))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| directed(a.cmp(b), spec.direction));
            sorted = keyed.into_iter().map(|(_, episode)| episode).collect();
        }
        SortAxis::Name => {
            let mut keyed: Vec<_> = sorted
                .into_iter()
                .map(|episode| (collation_key(&episode.anime_name), episode))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| directed(a.cmp(b), spec.direction));
            sorted = keyed.into_iter().map(|(_, episode)| episode).collect();
        }
    }
    sorted
}

/// Primary key ignores accents so "Éden" files next to "eden"; the secondary
/// key keeps accented and plain spellings in a fixed order.
fn collation_key(name: &str) -> (String, String) {
    let lowered = name.to_lowercase();
    let folded = lowered.nfd().filter(|ch| !is_combining_mark(*ch)).collect();
    (folded, lowered)
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

pub(crate) fn total_pages(total: usize, items_per_page: usize) -> usize {
    if items_per_page == 0 {
        return 0;
    }
    total / items_per_page + usize::from(total % items_per_page > 0)
}

/// Index range of `page` (1-based), clipped to the available items.
pub(crate) fn page_bounds(total: usize, items_per_page: usize, page: usize) -> Range<usize> {
    let min_index = if page > 1 {
        items_per_page.saturating_mul(page - 1)
    } else {
        0
    };
    let max_index = items_per_page.saturating_mul(page.max(1));
    min_index.min(total)..max_index.min(total)
}

/// Up to three consecutive page numbers starting one before the current page.
pub(crate) fn page_window(current_page: usize, total_pages: usize) -> RangeInclusive<usize> {
    let start = current_page.saturating_sub(1).max(1);
    let end = total_pages.min(start + PAGE_WINDOW - 1);
    start..=end
}

/// Stable identifiers for the page navigation controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PageControl {
    First,
    Previous,
    Page(usize),
    Next,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageState {
    current_page: usize,
    items_per_page: usize,
}

impl PageState {
    pub(crate) fn new(items_per_page: usize) -> Self {
        Self {
            current_page: 1,
            items_per_page: items_per_page.max(1),
        }
    }

    #[cfg(test)]
    pub(crate) fn current_page(&self) -> usize {
        self.current_page
    }

    pub(crate) fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    /// Always returns to the first page. Zero is ignored.
    pub(crate) fn set_items_per_page(&mut self, items_per_page: usize) {
        if items_per_page == 0 {
            return;
        }
        self.items_per_page = items_per_page;
        self.current_page = 1;
    }

    /// Steps through [`ITEMS_PER_PAGE_CHOICES`], wrapping around.
    pub(crate) fn cycle_items_per_page(&mut self) {
        let next = ITEMS_PER_PAGE_CHOICES
            .iter()
            .copied()
            .find(|choice| *choice > self.items_per_page)
            .unwrap_or(ITEMS_PER_PAGE_CHOICES[0]);
        self.set_items_per_page(next);
    }

    /// Moves straight to `page`, clamped into range. Commands without a
    /// visible page window use this instead of [`PageState::navigate`].
    pub(crate) fn jump_to(&mut self, page: usize, total_items: usize) {
        let pages = total_pages(total_items, self.items_per_page).max(1);
        self.current_page = page.clamp(1, pages);
    }

    pub(crate) fn clamp(&mut self, total_items: usize) {
        let pages = total_pages(total_items, self.items_per_page).max(1);
        self.current_page = self.current_page.clamp(1, pages);
    }

    pub(crate) fn is_disabled(&self, control: PageControl, total_pages: usize) -> bool {
        match control {
            PageControl::First | PageControl::Previous => self.current_page <= 1,
            PageControl::Next | PageControl::Last => self.current_page >= total_pages,
            PageControl::Page(page) => !page_window(self.current_page, total_pages).contains(&page),
        }
    }

    /// Applies a navigation control; returns whether the page changed.
    pub(crate) fn navigate(&mut self, control: PageControl, total_pages: usize) -> bool {
        if self.is_disabled(control, total_pages) {
            return false;
        }
        let target = match control {
            PageControl::First => 1,
            PageControl::Previous => self.current_page - 1,
            PageControl::Next => self.current_page + 1,
            PageControl::Last => total_pages,
            PageControl::Page(page) => page,
        };
        let target = target.clamp(1, total_pages.max(1));
        if target == self.current_page {
            return false;
        }
        self.current_page = target;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HistoryPage<'a> {
    pub(crate) rows: Vec<&'a WatchedEpisode>,
    pub(crate) bounds: Range<usize>,
    pub(crate) current_page: usize,
    pub(crate) total_pages: usize,
    pub(crate) total_items: usize,
    pub(crate) window: RangeInclusive<usize>,
}

/// Sorts the whole history, then cuts out the requested page.
pub(crate) fn paginate(history: &[WatchedEpisode], spec: SortSpec, page: PageState) -> HistoryPage<'_> {
    let total_items = history.len();
    let total_pages = total_pages(total_items, page.items_per_page);
    let bounds = page_bounds(total_items, page.items_per_page, page.current_page);
    let sorted = sort_history(history, spec);
    HistoryPage {
        rows: sorted[bounds.clone()].to_vec(),
        bounds,
        current_page: page.current_page,
        total_pages,
        total_items,
        window: page_window(page.current_page, total_pages),
    }
}
