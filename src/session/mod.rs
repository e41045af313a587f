//! Interactive shell sessions.
//!
//! A session wraps one interactive channel on a registered connection. Output
//! the remote side sends is collected in an [`OutputBuffer`] until a caller
//! reads it; input can be written at once or paced like a human typist.

mod buffer;
mod manager;
mod state;
mod typing;

pub use buffer::{OutputBuffer, ShellEventSink};
pub use manager::{
    ShellOptions, ShellSession, ShellSessionInfo, ShellSessionManager, DEFAULT_COLS,
    DEFAULT_READ_TIMEOUT, DEFAULT_ROWS,
};
pub use state::ShellState;
pub use typing::{TypingPacer, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY};
