//! Wires the `vte` VT parser to the [`Grid`], the OSC 697 handler, and the
//! shell-state machine. This is the "outer layer" spec.md §9 says should
//! consume typed events from the grid rather than close a callback cycle:
//! `feed` drains the [`ScreenEvent`]s produced while parsing one chunk and
//! hands them back to the caller instead of reaching back out itself.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use unicode_width::UnicodeWidthChar;
use vte::{Params, Parser, Perform};

use crate::colour::{self, Colour, ColourSupport};
use crate::extractor::extract_edit_buffer;
use crate::grid::Grid;
use crate::history::HistoryEntry;
use crate::osc::{self, Directive, OscAssembler};
use crate::shell_state::{self, PromptCursor, ShellState};

#[derive(Debug, Clone)]
pub enum ScreenEvent {
    Prompt,
    PreExec,
    HistoryFlush(HistoryEntry),
    Dir(String),
    ResyncCwd,
    LogLevel(String),
}

pub struct Screen {
    pub grid: Grid,
    pub shell_state: ShellState,
    pub prompt_cursor: PromptCursor,
    parser: Parser,
    assembler: OscAssembler,
    colour_support: ColourSupport,
    insertion_lock_path: PathBuf,
    last_cursor_col: usize,
    pending_command: Option<String>,
    pending_exit_code: Option<u32>,
    events: Vec<ScreenEvent>,
}

impl Screen {
    pub fn new(rows: usize, cols: usize, colour_support: ColourSupport, insertion_lock_path: PathBuf) -> Self {
        Screen {
            grid: Grid::new(rows, cols),
            shell_state: ShellState::new(),
            prompt_cursor: shell_state::SENTINEL,
            parser: Parser::new(),
            assembler: OscAssembler::new(),
            colour_support,
            insertion_lock_path,
            last_cursor_col: 0,
            pending_command: None,
            pending_exit_code: None,
            events: Vec::new(),
        }
    }

    /// Feed one chunk of shell output through the VT parser, returning the
    /// events raised while processing it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ScreenEvent> {
        let mut parser = std::mem::take(&mut self.parser);
        parser.advance(self, bytes);
        self.parser = parser;
        std::mem::take(&mut self.events)
    }

    /// Resizes the grid and relocates the PromptCursor by the same row
    /// shift applied to the grid's own cursor (spec.md §3: "adjusted when
    /// the screen scrolls"). If the shift would carry it outside the new
    /// grid it is invalidated back to the sentinel rather than left
    /// pointing at a row that no longer exists.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        let shift = self.grid.resize(rows, cols);
        if !shell_state::is_sentinel(self.prompt_cursor) {
            let new_row = self.prompt_cursor.row as isize + shift;
            if new_row < 0 || new_row as usize >= rows {
                self.prompt_cursor = shell_state::SENTINEL;
            } else {
                self.prompt_cursor.row = new_row as usize;
            }
        }
    }

    /// Current edit buffer, or `None` per the gating rules in
    /// `extractor::extract_edit_buffer`.
    pub fn edit_buffer(&self) -> Option<(String, usize)> {
        extract_edit_buffer(&self.grid, &self.shell_state, self.prompt_cursor, &self.insertion_lock_path)
    }

    fn note_cursor_moved(&mut self) {
        let col = self.grid.cursor().col;
        if col == 0 || self.last_cursor_col == 0 {
            self.events.push(ScreenEvent::ResyncCwd);
        }
        self.last_cursor_col = col;
    }

    /// Track lines pushed to scrollback by a wrap-induced scroll (spec.md
    /// §4.1's scroll callback with delta `-down`): the PromptCursor's row
    /// must shift with the content or it no longer points at the prompt.
    fn note_scrolled(&mut self, lines: usize) {
        if lines == 0 || shell_state::is_sentinel(self.prompt_cursor) {
            return;
        }
        if self.prompt_cursor.row < lines {
            self.prompt_cursor = shell_state::SENTINEL;
        } else {
            self.prompt_cursor.row -= lines;
        }
    }

    fn capture_pending_command(&mut self) {
        self.pending_command = self.edit_buffer().map(|(text, _)| text);
        self.pending_exit_code = None;
    }

    fn flush_pending_command(&mut self) {
        let Some(command) = self.pending_command.take() else { return };
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        self.events.push(ScreenEvent::HistoryFlush(HistoryEntry {
            command,
            shell: self.shell_state.shell_name.clone(),
            session_id: self.shell_state.session_id.clone(),
            cwd: self.shell_state.cwd.clone(),
            time: now,
            in_ssh: self.shell_state.in_ssh,
            in_docker: self.shell_state.in_docker,
            hostname: self.shell_state.hostname.clone(),
            exit_code: self.pending_exit_code.take().unwrap_or(0),
        }));
    }

    fn dispatch_directive(&mut self, directive: Directive) {
        match directive {
            Directive::NewCmd => {
                self.flush_pending_command();
                self.prompt_cursor = self.grid.cursor();
                self.shell_state.preexec = false;
                self.events.push(ScreenEvent::Prompt);
            }
            Directive::StartPrompt => {
                self.shell_state.in_prompt = true;
                self.grid.set_in_prompt(true);
                self.shell_state.seen_first_prompt = true;
            }
            Directive::EndPrompt => {
                self.shell_state.in_prompt = false;
                self.grid.set_in_prompt(false);
            }
            Directive::PreExec => {
                self.capture_pending_command();
                self.shell_state.preexec = true;
                self.events.push(ScreenEvent::PreExec);
            }
            Directive::Dir(path) => {
                self.shell_state.cwd = path.clone();
                self.events.push(ScreenEvent::Dir(path));
            }
            Directive::ExitCode(code) => self.pending_exit_code = Some(code),
            Directive::Shell(name) => self.shell_state.shell_name = name,
            Directive::FishSuggestionColor(spec) => {
                if self.shell_state.fish_suggestion_colour_text.as_deref() != Some(spec.as_str()) {
                    self.shell_state.fish_suggestion_colour = colour::parse_fish_colour(&spec, self.colour_support);
                    self.shell_state.fish_suggestion_colour_text = Some(spec);
                }
            }
            Directive::Tty(tty) => self.shell_state.tty = tty,
            Directive::Pid(pid) => self.shell_state.pid = pid,
            Directive::SessionId(id) => self.shell_state.session_id = id,
            Directive::Hostname(host) => self.shell_state.hostname = host,
            Directive::Docker(flag) => self.shell_state.in_docker = flag,
            Directive::Ssh(flag) => self.shell_state.in_ssh = flag,
            Directive::Log(level) => self.events.push(ScreenEvent::LogLevel(level)),
            Directive::Noop => {}
            Directive::Unknown(payload) => tracing::debug!(%payload, "unknown OSC 697 payload"),
        }
    }

    fn apply_sgr(&mut self, values: &[u16]) {
        let mut i = 0;
        if values.is_empty() {
            self.grid.reset_attrs();
            return;
        }
        while i < values.len() {
            match values[i] {
                0 => self.grid.reset_attrs(),
                30..=37 => self.grid.set_fg(Colour::Indexed((values[i] - 30) as u8)),
                90..=97 => self.grid.set_fg(Colour::Indexed((values[i] - 90 + 8) as u8)),
                39 => self.grid.set_fg(Colour::Default),
                40..=47 => self.grid.set_bg(Colour::Indexed((values[i] - 40) as u8)),
                100..=107 => self.grid.set_bg(Colour::Indexed((values[i] - 100 + 8) as u8)),
                49 => self.grid.set_bg(Colour::Default),
                38 | 48 => {
                    let is_fg = values[i] == 38;
                    match values.get(i + 1) {
                        Some(5) => {
                            if let Some(&idx) = values.get(i + 2) {
                                let c = Colour::Indexed(idx as u8);
                                if is_fg { self.grid.set_fg(c) } else { self.grid.set_bg(c) }
                            }
                            i += 2;
                        }
                        Some(2) => {
                            if let (Some(&r), Some(&g), Some(&b)) =
                                (values.get(i + 2), values.get(i + 3), values.get(i + 4))
                            {
                                let c = Colour::Rgb(r as u8, g as u8, b as u8);
                                if is_fg { self.grid.set_fg(c) } else { self.grid.set_bg(c) }
                            }
                            i += 4;
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            i += 1;
        }

        if let Some(suggestion_colour) = self.shell_state.fish_suggestion_colour {
            let matches = self.grid.current_fg() == suggestion_colour;
            self.grid.set_in_suggestion(matches);
        }
    }
}

fn param(params: &Params, idx: usize, default: u16) -> u16 {
    params.iter().nth(idx).and_then(|g| g.first().copied()).filter(|&v| v != 0).unwrap_or(default)
}

impl Perform for Screen {
    fn print(&mut self, c: char) {
        let width = c.width().unwrap_or(1);
        if width == 0 {
            let cursor = self.grid.cursor();
            let col = cursor.col.saturating_sub(1);
            self.grid.append_combining(cursor.row, col, c);
            return;
        }
        let scrolled = self.grid.putglyph(&[c], width);
        self.note_scrolled(scrolled);
        self.note_cursor_moved();
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x0A => {
                let scrolled = self.grid.linefeed();
                self.note_scrolled(scrolled);
            }
            0x0D => self.grid.carriage_return(),
            0x08 => self.grid.backspace(),
            0x09 => self.grid.tab(),
            _ => {}
        }
        self.note_cursor_moved();
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        if params.first().copied() != Some(b"697") {
            return;
        }
        let payload: Vec<u8> = params[1..].join(&b';');
        if let Some(assembled) = self.assembler.feed(&payload, true, true) {
            let text = String::from_utf8_lossy(&assembled);
            let directive = osc::parse_directive(&text);
            self.dispatch_directive(directive);
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        let private = intermediates.first() == Some(&b'?');
        match action {
            'A' => self.grid.move_cursor_relative(-(param(params, 0, 1) as i32), 0),
            'B' => self.grid.move_cursor_relative(param(params, 0, 1) as i32, 0),
            'C' => self.grid.move_cursor_relative(0, param(params, 0, 1) as i32),
            'D' => self.grid.move_cursor_relative(0, -(param(params, 0, 1) as i32)),
            'G' => {
                let row = self.grid.cursor().row;
                self.grid.move_cursor_to(row, param(params, 0, 1) as usize - 1);
            }
            'H' | 'f' => {
                let row = param(params, 0, 1) as usize - 1;
                let col = param(params, 1, 1) as usize - 1;
                self.grid.move_cursor_to(row, col);
            }
            'J' => self.grid.erase_display(param(params, 0, 0)),
            'K' => self.grid.erase_line(param(params, 0, 0)),
            'm' => {
                let values: Vec<u16> = params.iter().map(|g| g.first().copied().unwrap_or(0)).collect();
                self.apply_sgr(&values);
            }
            'h' if private => {
                if matches!(param(params, 0, 0), 47 | 1047 | 1049) {
                    self.grid.set_altscreen(true);
                }
            }
            'l' if private => {
                if matches!(param(params, 0, 0), 47 | 1047 | 1049) {
                    self.grid.set_altscreen(false);
                }
            }
            _ => {}
        }
        self.note_cursor_moved();
    }
}
