//! Edit-buffer extraction: turns the grid plus prompt-cell annotations
//! into the user's current command-line text and cursor byte offset.

use std::path::Path;

use crate::grid::{Grid, Rect};
use crate::shell_state::{self, PromptCursor, ShellState};

/// Right-trim trailing whitespace, clamping `index` to the trimmed length
/// (mirrors the original's two-argument `rtrim`).
fn rtrim_with_cursor(text: String, index: usize) -> (String, usize) {
    let trimmed_len = text.trim_end().len();
    let mut text = text;
    text.truncate(trimmed_len);
    (text, index.min(trimmed_len))
}

/// Returns `None` under any of: preexec, unsupported shell, insertion
/// lock present, no prompt seen yet, or altscreen active — matching
/// spec.md §4.3.
pub fn extract_edit_buffer(
    grid: &Grid,
    shell_state: &ShellState,
    prompt_cursor: PromptCursor,
    insertion_lock_path: &Path,
) -> Option<(String, usize)> {
    let insertion_locked = insertion_lock_path.exists();
    if !shell_state.can_send_buffer(insertion_locked) {
        return None;
    }
    if shell_state::is_sentinel(prompt_cursor) {
        return None;
    }
    if grid.is_altscreen() {
        return None;
    }

    let cols = grid.cols();
    let rows = grid.rows();
    if prompt_cursor.row >= rows {
        return None;
    }
    let cursor = grid.cursor();

    let row_rect = Rect {
        start_row: prompt_cursor.row,
        end_row: prompt_cursor.row + 1,
        start_col: 0,
        end_col: cols,
    };
    let (row_text, row_index) = grid.get_text(row_rect, prompt_cursor.col, Some(' '), true, Some(cursor));

    let row_len = row_text.len() + 1; // +1 for the newline separator appended below

    let rest_cursor = if row_index.is_some() { None } else { Some(cursor) };
    let rest_rect = Rect { start_row: prompt_cursor.row + 1, end_row: rows, start_col: 0, end_col: cols };
    let (rest_text, rest_index) = grid.get_text(rest_rect, 0, Some(' '), true, rest_cursor);

    let mut combined = String::with_capacity(row_len + rest_text.len());
    combined.push_str(&row_text);
    combined.push('\n');
    combined.push_str(&rest_text);

    let index = match (row_index, rest_index) {
        (Some(i), _) => Some(i),
        (None, Some(i)) => Some(row_len + i),
        (None, None) => None,
    }?;

    let (trimmed, clamped_index) = rtrim_with_cursor(combined, index);
    Some((trimmed, clamped_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Pos;
    use std::path::PathBuf;

    fn no_lock() -> PathBuf {
        PathBuf::from("/nonexistent/insertion-lock")
    }

    fn enabled_state() -> ShellState {
        let mut s = ShellState::new();
        s.shell_name = "bash".into();
        s
    }

    #[test]
    fn basic_echo_s1() {
        let mut grid = Grid::new(5, 80);
        grid.move_cursor_to(0, 0);
        for c in "$ ".chars() {
            grid.putglyph(&[c], 1);
        }
        let prompt = Pos { row: 0, col: 2 };
        for c in "hello".chars() {
            grid.putglyph(&[c], 1);
        }
        let (text, idx) = extract_edit_buffer(&grid, &enabled_state(), prompt, &no_lock()).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(idx, 5);
    }

    #[test]
    fn masked_prompt_s2() {
        let mut grid = Grid::new(5, 80);
        grid.set_in_prompt(true);
        for c in "$ ".chars() {
            grid.putglyph(&[c], 1);
        }
        grid.set_in_prompt(false);
        // PromptCursor is captured by NewCmd after the prompt text is
        // drawn, so it sits right after the masked "$ " cells.
        let prompt = Pos { row: 0, col: 2 };
        for c in "hello".chars() {
            grid.putglyph(&[c], 1);
        }
        let (text, idx) = extract_edit_buffer(&grid, &enabled_state(), prompt, &no_lock()).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(idx, 5);
    }

    #[test]
    fn preexec_mutes_extractor_s3() {
        let grid = Grid::new(5, 80);
        let mut state = enabled_state();
        state.preexec = true;
        let prompt = Pos { row: 0, col: 2 };
        assert!(extract_edit_buffer(&grid, &state, prompt, &no_lock()).is_none());
    }

    #[test]
    fn sentinel_prompt_returns_none() {
        let grid = Grid::new(5, 80);
        assert!(extract_edit_buffer(&grid, &enabled_state(), shell_state::SENTINEL, &no_lock()).is_none());
    }

    #[test]
    fn prompt_row_outside_grid_returns_none_instead_of_panicking() {
        let grid = Grid::new(5, 80);
        let prompt = Pos { row: 23, col: 2 };
        assert!(extract_edit_buffer(&grid, &enabled_state(), prompt, &no_lock()).is_none());
    }

    #[test]
    fn altscreen_returns_none() {
        let mut grid = Grid::new(5, 80);
        grid.set_altscreen(true);
        let prompt = Pos { row: 0, col: 0 };
        assert!(extract_edit_buffer(&grid, &enabled_state(), prompt, &no_lock()).is_none());
    }

    use proptest::prelude::*;

    proptest! {
        // Property 7: a printable ASCII string typed into a clean prompt
        // row round-trips through the extractor unchanged, cursor at its end.
        #[test]
        fn typed_ascii_round_trips(
            s in "[ -~]{0,60}",
        ) {
            let trimmed = s.trim_end();
            let mut grid = Grid::new(5, 80);
            grid.move_cursor_to(0, 0);
            let prompt = Pos { row: 0, col: 0 };
            for c in s.chars() {
                grid.putglyph(&[c], 1);
            }
            let result = extract_edit_buffer(&grid, &enabled_state(), prompt, &no_lock());
            prop_assert_eq!(result, Some((trimmed.to_string(), trimmed.len())));
        }
    }
}
