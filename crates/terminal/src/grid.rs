//! Screen Model: shadow cell grid, primary/alternate buffers, scrollback,
//! resize, and the masked text-extraction operation.
//!
//! Ported from the cell/attribute/buffer design in `screen.c`, driven here
//! by a `vte`-based VT parser rather than libvterm's callback table (see
//! `screen.rs`).

use std::collections::VecDeque;

use crate::colour::Colour;

pub const MAX_CHARS_PER_CELL: usize = 6;
const WIDE_GAP: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

/// Per-cell custom attributes the VT parser itself has no notion of.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attrs {
    pub in_prompt: bool,
    pub in_suggestion: bool,
    pub fg: Colour,
    pub bg: Colour,
}

/// One grid cell: up to [`MAX_CHARS_PER_CELL`] scalars (for combining
/// marks) plus the attrs in effect when it was written. An all-zero
/// `chars[0]` means blank; `WIDE_GAP` marks the right half of a
/// double-width glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub chars: [u32; MAX_CHARS_PER_CELL],
    pub attrs: Attrs,
}

impl Cell {
    fn blank(attrs: Attrs) -> Self {
        Cell { chars: [0; MAX_CHARS_PER_CELL], attrs }
    }

    fn wide_gap(attrs: Attrs) -> Self {
        let mut c = Cell::blank(attrs);
        c.chars[0] = WIDE_GAP;
        c
    }

    pub fn is_blank(&self) -> bool {
        self.chars[0] == 0
    }

    pub fn is_wide_gap(&self) -> bool {
        self.chars[0] == WIDE_GAP
    }
}

type Row = Vec<Cell>;

fn blank_row(cols: usize, attrs: Attrs) -> Row {
    (0..cols).map(|_| Cell::blank(attrs)).collect()
}

fn resize_row(mut row: Row, cols: usize, attrs: Attrs) -> Row {
    row.resize_with(cols, || Cell::blank(attrs));
    row
}

struct Buffer {
    rows: Vec<Row>,
}

impl Buffer {
    fn new(rows: usize, cols: usize) -> Self {
        Buffer { rows: (0..rows).map(|_| blank_row(cols, Attrs::default())).collect() }
    }

    fn row(&self, r: usize) -> &Row {
        &self.rows[r]
    }

    fn row_mut(&mut self, r: usize) -> &mut Row {
        &mut self.rows[r]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Primary,
    Alt,
}

pub struct Grid {
    rows: usize,
    cols: usize,
    primary: Buffer,
    alt: Buffer,
    active: Active,
    cursor: Pos,
    saved_primary_cursor: Pos,
    scrollback: VecDeque<Row>,
    scrollback_limit: usize,
    attrs: Attrs,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Grid {
            rows,
            cols,
            primary: Buffer::new(rows, cols),
            alt: Buffer::new(rows, cols),
            active: Active::Primary,
            cursor: Pos::default(),
            saved_primary_cursor: Pos::default(),
            scrollback: VecDeque::new(),
            scrollback_limit: 10_000,
            attrs: Attrs::default(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cursor(&self) -> Pos {
        self.cursor
    }

    pub fn is_altscreen(&self) -> bool {
        self.active == Active::Alt
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    fn active_buffer(&self) -> &Buffer {
        match self.active {
            Active::Primary => &self.primary,
            Active::Alt => &self.alt,
        }
    }

    fn active_buffer_mut(&mut self) -> &mut Buffer {
        match self.active {
            Active::Primary => &mut self.primary,
            Active::Alt => &mut self.alt,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.active_buffer().row(row)[col]
    }

    // -- attribute stamping --------------------------------------------

    pub fn set_in_prompt(&mut self, value: bool) {
        self.attrs.in_prompt = value;
    }

    pub fn set_in_suggestion(&mut self, value: bool) {
        self.attrs.in_suggestion = value;
    }

    pub fn set_fg(&mut self, colour: Colour) {
        self.attrs.fg = colour;
    }

    pub fn set_bg(&mut self, colour: Colour) {
        self.attrs.bg = colour;
    }

    pub fn current_fg(&self) -> Colour {
        self.attrs.fg
    }

    pub fn reset_attrs(&mut self) {
        self.attrs = Attrs::default();
    }

    // -- writing ---------------------------------------------------------

    /// Write a glyph at the cursor, advancing it. Returns the number of
    /// lines pushed to scrollback by any wrap-induced scroll.
    pub fn putglyph(&mut self, chars: &[char], width: usize) -> usize {
        let mut scrolled = 0;
        if self.cursor.col >= self.cols {
            scrolled += self.do_linefeed();
            self.cursor.col = 0;
        }

        let mut packed = [0u32; MAX_CHARS_PER_CELL];
        for (slot, c) in packed.iter_mut().zip(chars.iter()) {
            *slot = *c as u32;
        }
        let cell = Cell { chars: packed, attrs: self.attrs };
        let pos = self.cursor;
        let cols = self.cols;
        self.active_buffer_mut().row_mut(pos.row)[pos.col] = cell;

        if width == 2 && pos.col + 1 < cols {
            let gap = Cell::wide_gap(self.attrs);
            self.active_buffer_mut().row_mut(pos.row)[pos.col + 1] = gap;
        }

        self.cursor.col += width.max(1);
        scrolled
    }

    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
    }

    pub fn backspace(&mut self) {
        if self.cursor.col > 0 {
            self.cursor.col -= 1;
        }
    }

    /// Move to the next multiple of 8 (standard tab stops).
    pub fn tab(&mut self) {
        let next = (self.cursor.col / 8 + 1) * 8;
        self.cursor.col = next.min(self.cols.saturating_sub(1));
    }

    /// `\n`: move down, scrolling the active buffer if already at the
    /// bottom row. Returns lines pushed to scrollback.
    pub fn linefeed(&mut self) -> usize {
        self.do_linefeed()
    }

    fn do_linefeed(&mut self) -> usize {
        if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
            0
        } else {
            self.scroll_up(1)
        }
    }

    /// Append a combining-mark scalar to the cell at `(row, col)` rather
    /// than starting a new cell, up to [`MAX_CHARS_PER_CELL`] slots.
    pub fn append_combining(&mut self, row: usize, col: usize, c: char) {
        let cell = &mut self.active_buffer_mut().row_mut(row)[col];
        if let Some(slot) = cell.chars.iter_mut().find(|s| **s == 0) {
            *slot = c as u32;
        }
    }

    pub fn move_cursor_to(&mut self, row: usize, col: usize) {
        self.cursor = Pos { row: row.min(self.rows - 1), col: col.min(self.cols - 1) };
    }

    pub fn move_cursor_relative(&mut self, drow: i32, dcol: i32) {
        let row = (self.cursor.row as i32 + drow).clamp(0, self.rows as i32 - 1) as usize;
        let col = (self.cursor.col as i32 + dcol).clamp(0, self.cols as i32 - 1) as usize;
        self.cursor = Pos { row, col };
    }

    // -- erasing -----------------------------------------------------------

    /// `mode`: 0 = cursor..end of line, 1 = start..cursor, 2 = whole line.
    pub fn erase_line(&mut self, mode: u16) {
        let (start, end) = match mode {
            0 => (self.cursor.col, self.cols),
            1 => (0, self.cursor.col + 1),
            _ => (0, self.cols),
        };
        let attrs = self.attrs;
        let row = self.cursor.row;
        let cols = self.cols;
        let buf_row = self.active_buffer_mut().row_mut(row);
        for c in buf_row.iter_mut().take(end.min(cols)).skip(start) {
            *c = Cell::blank(attrs);
        }
    }

    /// `mode`: 0 = cursor..end of screen, 1 = start..cursor, 2/3 = whole
    /// screen.
    pub fn erase_display(&mut self, mode: u16) {
        let attrs = self.attrs;
        let (row0, col0, row1, col1) = match mode {
            0 => (self.cursor.row, self.cursor.col, self.rows, 0),
            1 => (0, 0, self.cursor.row, self.cursor.col + 1),
            _ => (0, 0, self.rows, self.cols),
        };
        let cols = self.cols;
        for r in 0..self.rows {
            let (start, end) = if mode == 0 {
                if r < row0 {
                    continue;
                } else if r == row0 {
                    (col0, cols)
                } else {
                    (0, cols)
                }
            } else if mode == 1 {
                if r > row1 {
                    continue;
                } else if r == row1 {
                    (0, col1.min(cols))
                } else {
                    (0, cols)
                }
            } else {
                (0, cols)
            };
            let buf_row = self.active_buffer_mut().row_mut(r);
            for c in buf_row.iter_mut().take(end).skip(start) {
                *c = Cell::blank(attrs);
            }
        }
        let _ = (row1, col1);
    }

    // -- scrolling -----------------------------------------------------------

    /// Scroll the active buffer up by `n` rows (new blank rows appear at
    /// the bottom). Rows scrolled out of the primary buffer are pushed to
    /// scrollback. Returns the number of lines actually pushed.
    pub fn scroll_up(&mut self, n: usize) -> usize {
        let n = n.min(self.rows);
        let push_to_scrollback = self.active == Active::Primary;
        let mut pushed = 0;
        for _ in 0..n {
            let cols = self.cols;
            let evicted = {
                let buf = self.active_buffer_mut();
                let mut row = buf.rows.remove(0);
                buf.rows.push(blank_row(cols, Attrs::default()));
                std::mem::take(&mut row)
            };
            if push_to_scrollback {
                self.scrollback.push_back(evicted);
                if self.scrollback.len() > self.scrollback_limit {
                    self.scrollback.pop_front();
                }
                pushed += 1;
            }
        }
        pushed
    }

    /// Scroll the active buffer down by `n` rows, pulling lines back from
    /// scrollback (tail-first) on the primary buffer if available.
    pub fn scroll_down(&mut self, n: usize) {
        let n = n.min(self.rows);
        for _ in 0..n {
            let cols = self.cols;
            let new_top = if self.active == Active::Primary {
                self.scrollback
                    .pop_back()
                    .map(|r| resize_row(r, cols, Attrs::default()))
                    .unwrap_or_else(|| blank_row(cols, Attrs::default()))
            } else {
                blank_row(cols, Attrs::default())
            };
            let buf = self.active_buffer_mut();
            buf.rows.pop();
            buf.rows.insert(0, new_top);
        }
    }

    // -- altscreen -----------------------------------------------------------

    pub fn set_altscreen(&mut self, enabled: bool) {
        match (self.active, enabled) {
            (Active::Primary, true) => {
                self.saved_primary_cursor = self.cursor;
                self.active = Active::Alt;
                self.cursor = Pos::default();
                self.alt = Buffer::new(self.rows, self.cols);
            }
            (Active::Alt, false) => {
                self.active = Active::Primary;
                self.cursor = self.saved_primary_cursor;
            }
            _ => {}
        }
    }

    // -- resize -----------------------------------------------------------

    /// Bottom-anchored resize: the old last row lands in the new last row;
    /// unfilled new rows at the top are back-filled from scrollback (tail
    /// first); old rows that don't fit are pushed to scrollback. Only the
    /// primary buffer interacts with scrollback.
    ///
    /// Returns the signed row delta applied to the cursor so callers can
    /// apply the same shift to other row-indexed state (e.g. the
    /// PromptCursor), matching the original's `scroll_cb` adjustment.
    pub fn resize(&mut self, new_rows: usize, new_cols: usize) -> isize {
        let old_rows_count = self.rows;
        let was_primary_active = self.active == Active::Primary;

        let cursor_before = self.cursor;
        self.primary = Self::resize_buffer(
            std::mem::replace(&mut self.primary, Buffer::new(0, 0)),
            new_rows,
            new_cols,
            &mut self.scrollback,
            self.scrollback_limit,
            true,
        );
        self.alt = Self::resize_buffer(
            std::mem::replace(&mut self.alt, Buffer::new(0, 0)),
            new_rows,
            new_cols,
            &mut self.scrollback,
            self.scrollback_limit,
            false,
        );

        let shift = new_rows as isize - old_rows_count as isize;
        let mut new_cursor_row =
            (cursor_before.row as isize + shift).clamp(0, new_rows as isize - 1) as usize;
        let new_cursor_col = cursor_before.col.min(new_cols - 1);

        self.rows = new_rows;
        self.cols = new_cols;
        self.cursor = Pos { row: new_cursor_row, col: new_cursor_col };

        if was_primary_active
            && new_cursor_row + 1 < new_rows
            && self.primary.row(0).iter().all(Cell::is_blank)
        {
            self.primary.rows.remove(new_rows - 1);
            self.primary.rows.insert(0, blank_row(new_cols, Attrs::default()));
            new_cursor_row += 1;
            self.cursor.row = new_cursor_row;
        }

        new_cursor_row as isize - cursor_before.row as isize
    }

    fn resize_buffer(
        old: Buffer,
        new_rows: usize,
        new_cols: usize,
        scrollback: &mut VecDeque<Row>,
        scrollback_limit: usize,
        use_scrollback: bool,
    ) -> Buffer {
        let old_rows: Vec<Row> = old
            .rows
            .into_iter()
            .map(|r| resize_row(r, new_cols, Attrs::default()))
            .collect();
        let old_len = old_rows.len();

        let mut new_rows_vec: Vec<Option<Row>> = (0..new_rows).map(|_| None).collect();
        let mut src_idx = old_len as isize - 1;
        let mut dst_idx = new_rows as isize - 1;
        let mut old_rows_iter: Vec<Option<Row>> = old_rows.into_iter().map(Some).collect();

        while dst_idx >= 0 && src_idx >= 0 {
            new_rows_vec[dst_idx as usize] = old_rows_iter[src_idx as usize].take();
            dst_idx -= 1;
            src_idx -= 1;
        }

        if use_scrollback {
            for row in old_rows_iter.into_iter().take((src_idx + 1).max(0) as usize).flatten() {
                scrollback.push_back(row);
                if scrollback.len() > scrollback_limit {
                    scrollback.pop_front();
                }
            }
        }

        while dst_idx >= 0 {
            let row = if use_scrollback {
                scrollback.pop_back().map(|r| resize_row(r, new_cols, Attrs::default()))
            } else {
                None
            };
            new_rows_vec[dst_idx as usize] =
                Some(row.unwrap_or_else(|| blank_row(new_cols, Attrs::default())));
            dst_idx -= 1;
        }

        Buffer {
            rows: new_rows_vec
                .into_iter()
                .map(|r| r.unwrap_or_else(|| blank_row(new_cols, Attrs::default())))
                .collect(),
        }
    }

    // -- extraction -----------------------------------------------------------

    /// Masked text extraction over `rect`. `mask = Some(' ')` elides
    /// prompt/suggestion cells as blanks; `mask = Some(other)` writes the
    /// mask character literally in their place; `mask = None` writes the
    /// real characters everywhere. If `cursor` is given, the byte offset at
    /// which the scan crosses it is returned.
    pub fn get_text(
        &self,
        rect: Rect,
        start_col_offset: usize,
        mask: Option<char>,
        wrap_lines: bool,
        cursor: Option<Pos>,
    ) -> (String, Option<usize>) {
        let mut out = String::new();
        let mut index = None;
        let mut padding = 0usize;

        for row in rect.start_row..rect.end_row {
            let mut last_char_was_padding = true;
            let start_col = rect.start_col + if row == rect.start_row { start_col_offset } else { 0 };

            for col in start_col..rect.end_col.min(self.cols) {
                if let Some(cur) = cursor {
                    if cur.row == row && cur.col == col {
                        for _ in 0..padding {
                            out.push(' ');
                        }
                        padding = 0;
                        index = Some(out.len());
                    }
                }

                let cell = self.cell(row, col);
                let masked_blank = mask == Some(' ') && (cell.attrs.in_prompt || cell.attrs.in_suggestion);

                if cell.is_blank() || masked_blank {
                    padding += 1;
                    last_char_was_padding = true;
                } else if cell.is_wide_gap() {
                    // no output
                } else {
                    for _ in 0..padding {
                        out.push(' ');
                    }
                    padding = 0;
                    if let Some(m) = mask {
                        if m != ' ' && (cell.attrs.in_prompt || cell.attrs.in_suggestion) {
                            out.push(m);
                            last_char_was_padding = false;
                            continue;
                        }
                    }
                    for &c in &cell.chars {
                        if c == 0 {
                            break;
                        }
                        if let Some(ch) = char::from_u32(c) {
                            out.push(ch);
                        }
                    }
                    last_char_was_padding = false;
                }
            }

            if row < rect.end_row - 1 {
                if last_char_was_padding || !wrap_lines {
                    out.push('\n');
                }
                padding = 0;
            }
        }

        (out, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_str(grid: &mut Grid, s: &str) {
        for c in s.chars() {
            grid.putglyph(&[c], 1);
        }
    }

    #[test]
    fn cell_count_invariant_holds_after_writes() {
        let mut grid = Grid::new(5, 10);
        write_str(&mut grid, "hello world this overflows a row by quite a lot");
        assert_eq!(grid.primary.row(0).len(), 10);
        assert_eq!(grid.primary.rows.len(), 5);
    }

    #[test]
    fn get_text_elides_trailing_blanks_with_linefeed() {
        let mut grid = Grid::new(3, 10);
        write_str(&mut grid, "hi");
        grid.move_cursor_to(1, 0);
        write_str(&mut grid, "yo");
        let (text, _) = grid.get_text(
            Rect { start_row: 0, end_row: 2, start_col: 0, end_col: 10 },
            0,
            None,
            true,
            None,
        );
        assert_eq!(text, "hi\nyo");
    }

    #[test]
    fn wide_gap_cells_produce_no_output() {
        let mut grid = Grid::new(1, 10);
        grid.putglyph(&['\u{4e2d}'], 2);
        grid.putglyph(&['x'], 1);
        let (text, _) = grid.get_text(
            Rect { start_row: 0, end_row: 1, start_col: 0, end_col: 10 },
            0,
            None,
            true,
            None,
        );
        assert_eq!(text, "\u{4e2d}x");
    }

    #[test]
    fn resize_grow_preserves_bottom_row() {
        let mut grid = Grid::new(24, 80);
        grid.move_cursor_to(23, 0);
        write_str(&mut grid, "$ hello");
        grid.resize(24, 100);
        assert_eq!(grid.cursor().row, 23);
        let (text, _) = grid.get_text(
            Rect { start_row: 23, end_row: 24, start_col: 0, end_col: 100 },
            0,
            None,
            true,
            None,
        );
        assert_eq!(text, "$ hello");
    }

    #[test]
    fn resize_shrink_pushes_to_scrollback() {
        let mut grid = Grid::new(24, 80);
        for i in 0..23 {
            grid.move_cursor_to(i, 0);
            write_str(&mut grid, &format!("line{i}"));
        }
        grid.move_cursor_to(23, 0);
        write_str(&mut grid, "$ prompt");
        grid.resize(12, 80);
        assert_eq!(grid.scrollback_len(), 12);
        assert_eq!(grid.cursor().row, 11);
    }

    #[test]
    fn get_text_is_idempotent() {
        let mut grid = Grid::new(2, 10);
        write_str(&mut grid, "hi");
        let rect = Rect { start_row: 0, end_row: 1, start_col: 0, end_col: 10 };
        let (a, _) = grid.get_text(rect, 0, None, true, None);
        let (b, _) = grid.get_text(rect, 0, None, true, None);
        assert_eq!(a, b);
    }

    use proptest::prelude::*;

    fn printable_ascii() -> impl Strategy<Value = char> {
        (0x20u8..0x7f).prop_map(|b| b as char)
    }

    proptest! {
        // Property 2: cell count in each buffer is exactly rows * cols at
        // all times, for any sequence of glyph writes and movements.
        #[test]
        fn cell_count_is_always_rows_times_cols(
            rows in 1usize..20,
            cols in 1usize..40,
            chars in prop::collection::vec(printable_ascii(), 0..200),
        ) {
            let mut grid = Grid::new(rows, cols);
            for c in chars {
                if c == '\n' {
                    grid.linefeed();
                } else {
                    grid.putglyph(&[c], 1);
                }
            }
            let total: usize = grid.primary.rows.iter().map(|r| r.len()).sum();
            prop_assert_eq!(total, rows * cols);
            let total_alt: usize = grid.alt.rows.iter().map(|r| r.len()).sum();
            prop_assert_eq!(total_alt, rows * cols);
        }

        // Property 3: after a resize, every cell within the overlap of old
        // and new dimensions either matches its pre-resize value or is
        // accounted for by the scrollback push/pop the resize performed.
        #[test]
        fn resize_preserves_overlap_or_scrollback(
            cols in 10usize..60,
            new_rows in 1usize..30,
            new_cols in 10usize..60,
            text in prop::collection::vec(printable_ascii(), 0..30),
        ) {
            let old_rows = 24;
            let mut grid = Grid::new(old_rows, cols);
            grid.move_cursor_to(old_rows - 1, 0);
            for c in text.iter() {
                grid.putglyph(&[*c], 1);
            }
            let bottom_before: Vec<Cell> = grid.primary.row(old_rows - 1).clone();
            grid.resize(new_rows, new_cols);
            prop_assert_eq!(grid.rows(), new_rows);
            prop_assert_eq!(grid.cols(), new_cols);
            let overlap_cols = cols.min(new_cols);
            // The bottom-anchored resize keeps the last written row at the
            // bottom of the new grid whenever it still fits.
            let new_bottom = grid.primary.row(new_rows - 1);
            for (i, cell) in bottom_before.iter().take(overlap_cols).enumerate() {
                prop_assert_eq!(&new_bottom[i], cell);
            }
        }
    }
}
