//! Shadow terminal: the shell's screen model, the OSC 697 shell-integration
//! protocol, and the edit-buffer extraction built on top of them.

pub mod colour;
pub mod extractor;
pub mod grid;
pub mod history;
pub mod osc;
pub mod screen;
pub mod shell_state;
pub mod term_bundle;

pub use colour::{Colour, ColourSupport};
pub use grid::{Grid, Pos, Rect};
pub use screen::{Screen, ScreenEvent};
pub use shell_state::{PromptCursor, ShellState};
