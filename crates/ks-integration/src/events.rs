//! Event sources and the liveness flag

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Input the state handlers react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The user or the window system asked to close
    CloseRequested,
    /// Request to move to a raw state value
    Navigate(i32),
    /// Nothing happened
    Idle,
}

/// Blocking source of events
pub trait EventSource {
    /// Wait for the next event; `None` once the source is drained
    fn next_event(&mut self) -> Option<Event>;
}

/// Shared run flag; clearing it stops the state loop
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Ask the loop to stop; safe from any thread
    pub fn request_stop(&self) {
        if self.0.swap(false, Ordering::AcqRel) {
            debug!("Stop requested");
        }
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one console command
///
/// Recognized: `quit`/`exit`/`close`, `menu`, `select`, `play`, `load`,
/// `credits`, a raw state number, or an empty line for [`Event::Idle`].
pub fn parse_command(line: &str) -> Option<Event> {
    let command = line.trim().to_ascii_lowercase();
    let event = match command.as_str() {
        "" => Event::Idle,
        "quit" | "exit" | "close" => Event::CloseRequested,
        "menu" => Event::Navigate(1),
        "select" => Event::Navigate(2),
        "play" => Event::Navigate(3),
        "load" => Event::Navigate(4),
        "credits" => Event::Navigate(5),
        other => Event::Navigate(other.parse().ok()?),
    };
    Some(event)
}

/// Line-oriented command source, stdin by default
pub struct ConsoleEvents<R> {
    reader: R,
    /// Written before every read when a person is typing the commands
    prompt: Option<Box<dyn Write>>,
}

impl ConsoleEvents<std::io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock())
    }
}

impl<R: BufRead> ConsoleEvents<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, prompt: None }
    }

    /// Print a prompt to `out` before each command is read
    pub fn with_prompt(mut self, out: impl Write + 'static) -> Self {
        self.prompt = Some(Box::new(out));
        self
    }

    fn show_prompt(&mut self) {
        if let Some(out) = self.prompt.as_mut() {
            if write!(out, "> ").and_then(|_| out.flush()).is_err() {
                self.prompt = None;
            }
        }
    }
}

impl<R: BufRead> EventSource for ConsoleEvents<R> {
    fn next_event(&mut self) -> Option<Event> {
        let mut line = String::new();
        loop {
            line.clear();
            self.show_prompt();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => match parse_command(&line) {
                    Some(event) => return Some(event),
                    None => warn!("Unknown command {:?}", line.trim()),
                },
                Err(e) => {
                    warn!("Event source failed: {}", e);
                    return None;
                }
            }
        }
    }
}

/// Replays a fixed list of events
#[derive(Debug, Clone, Default)]
pub struct ScriptedEvents {
    events: VecDeque<Event>,
}

impl ScriptedEvents {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Events not yet delivered
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ScriptedEvents {
    fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("QUIT\n"), Some(Event::CloseRequested));
        assert_eq!(parse_command(" play "), Some(Event::Navigate(3)));
        assert_eq!(parse_command("99"), Some(Event::Navigate(99)));
        assert_eq!(parse_command(""), Some(Event::Idle));
        assert_eq!(parse_command("dance"), None);
    }

    #[test]
    fn test_console_events() {
        let mut events = ConsoleEvents::new(Cursor::new("select\nbogus\n\ncredits\n"));
        assert_eq!(events.next_event(), Some(Event::Navigate(2)));
        assert_eq!(events.next_event(), Some(Event::Idle));
        assert_eq!(events.next_event(), Some(Event::Navigate(5)));
        assert_eq!(events.next_event(), None);
    }

    #[test]
    fn test_console_prompt() {
        let out = crate::testing::LogBuffer::default();
        let mut events = ConsoleEvents::new(Cursor::new("menu\nquit\n")).with_prompt(out.clone());
        assert_eq!(events.next_event(), Some(Event::Navigate(1)));
        assert_eq!(events.next_event(), Some(Event::CloseRequested));
        assert_eq!(out.contents(), "> > ");

        let mut silent = ConsoleEvents::new(Cursor::new("play\n"));
        assert_eq!(silent.next_event(), Some(Event::Navigate(3)));
    }

    #[test]
    fn test_scripted_events() {
        let mut events = ScriptedEvents::new([Event::Idle, Event::CloseRequested]);
        assert_eq!(events.remaining(), 2);
        assert_eq!(events.next_event(), Some(Event::Idle));
        assert_eq!(events.next_event(), Some(Event::CloseRequested));
        assert_eq!(events.next_event(), None);
    }

    #[test]
    fn test_liveness_shared() {
        let live = Liveness::new();
        let remote = live.clone();
        assert!(live.is_alive());

        std::thread::spawn(move || remote.request_stop()).join().unwrap();
        assert!(!live.is_alive());
    }
}
