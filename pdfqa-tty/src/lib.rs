use std::io::{self, Write};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use pdfqa_core::ViewCommand;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(ViewCommand),
    Highlight,
    BeginQuery,
    QueryChanged { query: String },
    QuerySubmit { query: String },
    QueryCancel,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Query,
}

/// Maps key presses to match-navigation events, keeping numeric count
/// prefixes (`3n` moves three matches forward) across calls.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    query_buffer: String,
}

impl EventMapper {
    const ZOOM_STEP: f32 = 1.1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.query_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Query => self.map_event_query(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('n'), KeyModifiers::NONE)
            | (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Command(ViewCommand::NextMatch { count })
            }
            (KeyCode::Char('N'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                let count = self.take_count();
                UiEvent::Command(ViewCommand::PrevMatch { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Command(ViewCommand::PrevMatch { count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.reset_count();
                UiEvent::Command(ViewCommand::FirstMatch)
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::Command(ViewCommand::LastMatch)
            }
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Command(ViewCommand::ScaleBy {
                    factor: Self::ZOOM_STEP,
                })
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(ViewCommand::ScaleBy {
                    factor: 1.0 / Self::ZOOM_STEP,
                })
            }
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(ViewCommand::ResetScale)
            }
            (KeyCode::Char('h'), KeyModifiers::NONE) | (KeyCode::Enter, _) => {
                self.reset_count();
                UiEvent::Highlight
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Query);
                UiEvent::BeginQuery
            }
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_query(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::QueryCancel
            }
            (KeyCode::Enter, _) => {
                let query = std::mem::take(&mut self.query_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::QuerySubmit { query }
            }
            (KeyCode::Backspace, _) => {
                self.query_buffer.pop();
                UiEvent::QueryChanged {
                    query: self.query_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.query_buffer.push(c);
                UiEvent::QueryChanged {
                    query: self.query_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Text for the status line: the query being typed or the count prefix.
    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::Query) {
            return Some(format!("/{}", self.query_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "\r{}", label)?;
    writer.flush()
}
