use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor;
use crossterm::event;
use crossterm::terminal::{self, Clear, ClearType};
use pdfqa_core::{LocatorError, ViewEvent, ViewSession};
use pdfqa_tty::{write_status_line, EventMapper, UiEvent};

const HELP: &str =
    "n/N next/prev match (count prefix ok) · g/G first/last · h highlight · / new query · +/-/= zoom · q quit";

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

/// Interactive match browser over an already-populated session.
pub async fn run(session: &mut ViewSession) -> Result<()> {
    let _raw_mode = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    let mut mapper = EventMapper::new();

    print_line(&mut stdout, HELP)?;
    report_events(&mut stdout, session)?;

    loop {
        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        match mapper.map_event(event::read()?) {
            UiEvent::Quit => break,
            UiEvent::Command(command) => {
                if let Err(err) = session.apply(command) {
                    print_line(&mut stdout, &format!("! {err}"))?;
                }
            }
            UiEvent::Highlight => match session.locator().highlight_current().await {
                Ok(url) => print_line(&mut stdout, &format!("highlighted copy: {url}"))?,
                Err(err) => print_line(&mut stdout, &format!("! {err}"))?,
            },
            UiEvent::QuerySubmit { query } => match session.locate(&query).await {
                // Reported through the event queue.
                Ok(_) | Err(LocatorError::NotFound { .. }) => {}
                Err(err) => print_line(&mut stdout, &format!("! {err}"))?,
            },
            UiEvent::BeginQuery
            | UiEvent::QueryChanged { .. }
            | UiEvent::QueryCancel
            | UiEvent::None => {}
        }
        report_events(&mut stdout, session)?;
        crossterm::execute!(stdout, Clear(ClearType::CurrentLine))?;
        write_status_line(&mut stdout, &mapper.pending_input().unwrap_or_default())?;
    }

    print_line(&mut stdout, "")?;
    Ok(())
}

fn report_events(stdout: &mut io::Stdout, session: &ViewSession) -> Result<()> {
    for event in session.drain_events() {
        crossterm::execute!(stdout, Clear(ClearType::CurrentLine))?;
        print_line(stdout, &describe_event(&event))?;
    }
    Ok(())
}

fn print_line(stdout: &mut io::Stdout, line: &str) -> io::Result<()> {
    // Raw mode does not translate \n.
    write!(stdout, "\r{}\r\n", line)?;
    stdout.flush()
}

pub fn describe_event(event: &ViewEvent) -> String {
    match event {
        ViewEvent::DocumentOpened(id) => format!("opened document {id}"),
        ViewEvent::DocumentClosed(id) => format!("closed document {id}"),
        ViewEvent::MatchSelected {
            index,
            total,
            page_number,
            bbox,
            ..
        } => format!(
            "match {}/{} · page {} · ({:.0}, {:.0})-({:.0}, {:.0})",
            index + 1,
            total,
            page_number,
            bbox.x0,
            bbox.y0,
            bbox.x1,
            bbox.y1
        ),
        ViewEvent::MatchNotFound { query, .. } => {
            format!("\"{query}\" was not found in this document")
        }
        ViewEvent::ScaleChanged(scale) => format!("zoom {:.0}%", scale * 100.0),
    }
}
