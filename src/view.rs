//! Generic virtualized viewport over an ordered sequence of rendered lines.
//!
//! A `TextView` never owns the data it shows: it pulls exactly the rows it
//! needs from a [`RowSource`] and caches them until the origin moves or the
//! source reports a change.

/// Pull interface a view fetches rows through.
pub trait RowSource {
    fn row_count(&self) -> usize;
    fn visible_rows(&self, origin: usize, count: usize) -> Vec<String>;
    fn content_width(&self) -> usize;
}

/// Columns moved per horizontal scroll step.
pub const H_SCROLL_STEP: usize = 5;

/// Windowed viewer state: absolute cursor row, window origin and horizontal
/// offset over a virtual buffer of `content_height` rows.
///
/// Invariants after every operation:
/// `origin_row <= cursor_row < origin_row + viewport_height` and
/// `0 <= cursor_col <= max(0, content_width - viewport_width)`.
#[derive(Debug, Clone, Default)]
pub struct TextView {
    cursor_row: usize,
    origin_row: usize,
    cursor_col: usize,
    origin_col: usize,
    content_width: usize,
    content_height: usize,
    viewport_width: usize,
    viewport_height: usize,
    window: Vec<String>,
}

impl TextView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt the physical pane size; re-clamps and refetches when it changed.
    pub fn set_viewport(&mut self, width: usize, height: usize, source: &dyn RowSource) {
        if width == self.viewport_width && height == self.viewport_height {
            return;
        }
        self.viewport_width = width;
        self.viewport_height = height;
        self.data_changed(source);
    }

    /// Move the cursor by `delta` rows, shifting the origin by the minimum
    /// amount needed to keep the cursor visible. Returns the new absolute row
    /// only when it actually changed.
    pub fn move_by(&mut self, delta: isize, source: &dyn RowSource) -> Option<usize> {
        let rows = source.row_count();
        if rows == 0 {
            return None;
        }
        let next = (self.cursor_row as isize + delta).clamp(0, rows as isize - 1) as usize;
        let changed = next != self.cursor_row;
        self.cursor_row = next;

        let height = self.viewport_height.max(1);
        let origin_before = self.origin_row;
        if next < self.origin_row {
            self.origin_row = next;
        } else if next >= self.origin_row + height {
            self.origin_row = next + 1 - height;
        }
        if self.origin_row != origin_before {
            self.content_height = rows;
            self.refetch(source);
        }

        changed.then_some(next)
    }

    /// Move the cursor to an absolute row.
    pub fn move_to(&mut self, row: usize, source: &dyn RowSource) -> Option<usize> {
        self.move_by(row as isize - self.cursor_row as isize, source)
    }

    /// Move by one viewport height minus a line of overlap.
    pub fn page(&mut self, direction: isize, source: &dyn RowSource) -> Option<usize> {
        let step = self.viewport_height.saturating_sub(1).max(1) as isize;
        self.move_by(direction.signum() * step, source)
    }

    /// Shift the horizontal offset by one step. Purely local: the cursor and
    /// origin columns move together and no rows are refetched.
    pub fn scroll_horizontal(&mut self, direction: isize) {
        let max_col = self.content_width.saturating_sub(self.viewport_width);
        let next = if direction < 0 {
            self.cursor_col.saturating_sub(H_SCROLL_STEP)
        } else {
            self.cursor_col.saturating_add(H_SCROLL_STEP)
        };
        self.cursor_col = next.min(max_col);
        self.origin_col = self.cursor_col;
    }

    /// The source's content changed: re-measure, clamp the cursor and origin
    /// back into range, refetch the visible window.
    pub fn data_changed(&mut self, source: &dyn RowSource) {
        self.content_height = source.row_count();
        self.content_width = source.content_width();

        let height = self.viewport_height.max(1);
        if self.content_height == 0 {
            self.cursor_row = 0;
            self.origin_row = 0;
        } else {
            self.cursor_row = self.cursor_row.min(self.content_height - 1);
            self.origin_row = self.origin_row.min(self.content_height.saturating_sub(height));
            if self.cursor_row < self.origin_row {
                self.origin_row = self.cursor_row;
            } else if self.cursor_row >= self.origin_row + height {
                self.origin_row = self.cursor_row + 1 - height;
            }
        }

        let max_col = self.content_width.saturating_sub(self.viewport_width);
        self.cursor_col = self.cursor_col.min(max_col);
        self.origin_col = self.cursor_col;

        self.refetch(source);
    }

    fn refetch(&mut self, source: &dyn RowSource) {
        let height = self.viewport_height.max(1);
        let count = height.min(self.content_height.saturating_sub(self.origin_row));
        self.window = source.visible_rows(self.origin_row, count);
    }

    /// The cached visible rows, starting at the window origin.
    pub fn window(&self) -> &[String] {
        &self.window
    }

    pub fn cursor_row(&self) -> usize {
        self.cursor_row
    }

    pub fn origin_row(&self) -> usize {
        self.origin_row
    }

    /// Cursor position relative to the window origin.
    pub fn cursor_in_window(&self) -> usize {
        self.cursor_row - self.origin_row
    }

    /// Current horizontal offset applied to every rendered row.
    pub fn h_offset(&self) -> usize {
        self.origin_col
    }

    pub fn content_height(&self) -> usize {
        self.content_height
    }
}
