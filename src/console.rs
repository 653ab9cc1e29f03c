//! The terminal boundary: everything the machine reads from or writes to
//! the outside world funnels through this one trait, so `src/machine.rs`
//! and `src/instructions.rs` never touch a terminal crate directly and
//! tests can swap in an in-memory double.

use std::io::Write;

/// Grounded on the teacher's own `VM` struct holding its rendering surface
/// directly (`src/vm.rs`) rather than behind a trait object — here the
/// surface is a real terminal in production and a buffer in tests, so the
/// trait boundary is the idiomatic equivalent.
pub trait Console {
    fn print(&mut self, text: &str);
    fn read_line(&mut self) -> String;
    fn clear_screen(&mut self);
    /// Is a key currently waiting to be read, without blocking?
    fn key_pending(&mut self) -> bool;
    /// Consumes and returns the pending key (0 if none).
    fn read_key(&mut self) -> u8;
}

/// A real terminal, built on `crossterm` the way the other example repos
/// in the pack reach for it for raw-mode key polling.
pub struct RealConsole {
    raw_mode: bool,
}

impl RealConsole {
    pub fn new() -> Self {
        RealConsole { raw_mode: false }
    }

    fn ensure_raw_mode(&mut self) {
        if !self.raw_mode {
            let _ = crossterm::terminal::enable_raw_mode();
            self.raw_mode = true;
        }
    }
}

impl Default for RealConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RealConsole {
    fn drop(&mut self) {
        if self.raw_mode {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

impl Console for RealConsole {
    fn print(&mut self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    fn clear_screen(&mut self) {
        print!("\x1b[2J\x1b[H");
        let _ = std::io::stdout().flush();
    }

    fn key_pending(&mut self) -> bool {
        self.ensure_raw_mode();
        matches!(crossterm::event::poll(std::time::Duration::from_millis(0)), Ok(true))
    }

    fn read_key(&mut self) -> u8 {
        self.ensure_raw_mode();
        if let Ok(crossterm::event::Event::Key(key)) = crossterm::event::read() {
            match key.code {
                crossterm::event::KeyCode::Char(c) => c as u8,
                crossterm::event::KeyCode::Esc => 27,
                crossterm::event::KeyCode::Enter => 13,
                crossterm::event::KeyCode::Backspace => 8,
                _ => 0,
            }
        } else {
            0
        }
    }
}

/// An in-memory console for tests: reads come from a pre-loaded queue of
/// lines/keys, writes accumulate into a buffer the test can inspect.
#[derive(Default)]
pub struct TestConsole {
    pub output: String,
    pub input_lines: std::collections::VecDeque<String>,
    pub pending_keys: std::collections::VecDeque<u8>,
}

impl TestConsole {
    pub fn new() -> Self {
        TestConsole::default()
    }

    pub fn with_input(lines: &[&str]) -> Self {
        TestConsole { input_lines: lines.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }
}

impl Console for TestConsole {
    fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn read_line(&mut self) -> String {
        self.input_lines.pop_front().unwrap_or_default()
    }

    fn clear_screen(&mut self) {
        self.output.push_str("\x1b[2J\x1b[H");
    }

    fn key_pending(&mut self) -> bool {
        !self.pending_keys.is_empty()
    }

    fn read_key(&mut self) -> u8 {
        self.pending_keys.pop_front().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_echoes_queued_input() {
        let mut c = TestConsole::with_input(&["hello"]);
        assert_eq!(c.read_line(), "hello");
        assert_eq!(c.read_line(), "");
    }

    #[test]
    fn test_console_accumulates_output() {
        let mut c = TestConsole::new();
        c.print("A");
        c.print("B");
        assert_eq!(c.output, "AB");
    }
}
