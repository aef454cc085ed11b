//! Output rendering for streamed chat turns.
//!
//! A trait-based rendering abstraction so the REPL can print to a terminal with ANSI
//! styling, to a pipe without it, or into a buffer under test.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Source;

/// ANSI escape code for dim text (used for the retrieval status).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for the retrieval status).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for source citations).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Captured output for tests
pub trait Renderer: Send {
    /// Called when an assistant turn starts. `searching` is true while the service
    /// looks through the knowledge base.
    fn start_turn(&mut self, searching: bool) {
        _ = searching;
    }

    /// Print a chunk of answer text.
    ///
    /// This is called incrementally as deltas arrive.
    fn print_text(&mut self, text: &str);

    /// Print the documents the answer is grounded on.
    fn print_sources(&mut self, sources: &[Source]);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    in_status: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            in_status: false,
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Gives back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        // A closed terminal is not worth failing a turn over.
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    fn end_line(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    fn clear_status(&mut self) {
        if self.in_status {
            self.in_status = false;
            if self.use_color {
                self.write(ANSI_RESET);
            }
            self.end_line();
        }
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn start_turn(&mut self, searching: bool) {
        self.end_line();
        if searching {
            self.in_status = true;
            if self.use_color {
                self.write(&format!("{ANSI_DIM}{ANSI_ITALIC}searching the knowledge base..."));
            } else {
                self.write("[searching the knowledge base...]");
            }
        }
    }

    fn print_text(&mut self, text: &str) {
        self.clear_status();
        self.write(text);
    }

    fn print_sources(&mut self, sources: &[Source]) {
        self.clear_status();
        if sources.is_empty() {
            return;
        }
        let listed = sources
            .iter()
            .map(Source::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if self.use_color {
            self.write(&format!("{ANSI_CYAN}[sources: {listed}]{ANSI_RESET}\n"));
        } else {
            self.write(&format!("[sources: {listed}]\n"));
        }
    }

    fn print_error(&mut self, error: &str) {
        self.clear_status();
        self.end_line();
        if self.use_color {
            self.write(&format!("{ANSI_RED}Error: {error}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("Error: {error}\n"));
        }
    }

    fn print_info(&mut self, info: &str) {
        self.clear_status();
        self.end_line();
        self.write(&format!("{info}\n"));
    }

    fn finish_response(&mut self) {
        self.clear_status();
        self.end_line();
    }

    fn print_interrupted(&mut self) {
        self.clear_status();
        self.end_line();
        self.write("[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
