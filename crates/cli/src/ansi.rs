//! ANSI escape sequences.
//!
//! Output goes through 'anstream', which strips these when the terminal does
//! not support them.

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BOLD: &str = "\x1b[1m";
pub const RESET: &str = "\x1b[0m";
