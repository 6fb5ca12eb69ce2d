use crate::error::PiTraceError;
use crate::git::repository::{Repository, find_repository};
use crate::trace::record::TraceRecord;
use crate::trace::store::TraceStore;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use similar::{ChangeTag, TextDiff};
use std::io::{self, IsTerminal};

fn prompt_snippet(trace: &TraceRecord, width: usize) -> String {
    let message = trace.metadata.user_message.trim().replace('\n', " ");
    if message.is_empty() {
        return "(no prompt text)".to_string();
    }
    let mut shortened: String = message.chars().take(width).collect();
    if shortened.len() < message.len() {
        shortened.push('…');
    }
    shortened
}

fn short_id(trace: &TraceRecord) -> &str {
    trace.id.get(..8).unwrap_or(&trace.id)
}

/// `pi-trace traces`: list local traces, pick one, view its diff.
pub fn run_traces() -> Result<(), PiTraceError> {
    let repo = find_repository()?;
    let store = TraceStore::for_worktree(repo.workdir());
    let mut traces = store.read_all()?;
    if traces.is_empty() {
        return Err(PiTraceError::Generic(
            "no traces recorded in this working tree".to_string(),
        ));
    }
    traces.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if !io::stdout().is_terminal() {
        for trace in &traces {
            println!(
                "{}  {}  {} file(s)  {}",
                trace.timestamp,
                short_id(trace),
                trace.files.len(),
                prompt_snippet(trace, 60)
            );
        }
        return Ok(());
    }

    run_browser(&repo, &traces)
}

enum Screen {
    Picker,
    DiffView { lines: Vec<Line<'static>>, scroll: u16 },
}

fn run_browser(repo: &Repository, traces: &[TraceRecord]) -> Result<(), PiTraceError> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut selected = 0usize;
    let mut screen = Screen::Picker;

    let result = loop {
        match &screen {
            Screen::Picker => {
                terminal.draw(|f| render_picker(f, traces, selected))?;
            }
            Screen::DiffView { lines, scroll } => {
                let scroll = *scroll;
                terminal.draw(|f| render_diff_view(f, &traces[selected], lines, scroll))?;
            }
        }

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let mut transition: Option<Screen> = None;
            match &mut screen {
                Screen::Picker => match key.code {
                    KeyCode::Esc | KeyCode::Char('q') => break Ok(()),
                    KeyCode::Up | KeyCode::Char('k') => {
                        selected = selected.saturating_sub(1);
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        if selected + 1 < traces.len() {
                            selected += 1;
                        }
                    }
                    KeyCode::Enter => {
                        match build_diff_lines(repo, &traces[selected]) {
                            Ok(lines) => transition = Some(Screen::DiffView { lines, scroll: 0 }),
                            Err(e) => break Err(e),
                        }
                    }
                    _ => {}
                },
                Screen::DiffView { lines, scroll } => match key.code {
                    KeyCode::Esc | KeyCode::Char('q') => transition = Some(Screen::Picker),
                    KeyCode::Up | KeyCode::Char('k') => {
                        *scroll = scroll.saturating_sub(1);
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        if (*scroll as usize) + 1 < lines.len() {
                            *scroll += 1;
                        }
                    }
                    KeyCode::PageUp => *scroll = scroll.saturating_sub(20),
                    KeyCode::PageDown => {
                        *scroll = (*scroll + 20).min(lines.len().saturating_sub(1) as u16);
                    }
                    _ => {}
                },
            }
            if let Some(next) = transition {
                screen = next;
            }
        }
    };

    // Cleanup
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn render_picker(f: &mut Frame, traces: &[TraceRecord], selected: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(3),    // List
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    let header = Paragraph::new("Traces")
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);
    f.render_widget(header, chunks[0]);

    let visible_rows = chunks[1].height.saturating_sub(2) as usize;
    let first = selected.saturating_sub(visible_rows.saturating_sub(1));

    let mut lines = Vec::new();
    for (index, trace) in traces.iter().enumerate().skip(first).take(visible_rows.max(1)) {
        let marker = if index == selected { "> " } else { "  " };
        let style = if index == selected {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        lines.push(Line::from(Span::styled(
            format!(
                "{}{}  {}  {} file(s)  {}",
                marker,
                trace.timestamp,
                short_id(trace),
                trace.files.len(),
                prompt_snippet(trace, 48)
            ),
            style,
        )));
    }

    let list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("{} trace(s), newest first", traces.len())),
    );
    f.render_widget(list, chunks[1]);

    let footer = Paragraph::new("j/k: Move | Enter: Diff | q: Quit")
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center);
    f.render_widget(footer, chunks[2]);
}

fn render_diff_view(f: &mut Frame, trace: &TraceRecord, lines: &[Line<'static>], scroll: u16) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(3),    // Diff
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    let header = Paragraph::new(prompt_snippet(trace, 70))
        .block(Block::default().borders(Borders::ALL).title("Prompt"))
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(header, chunks[0]);

    let body = Paragraph::new(lines.to_vec())
        .block(Block::default().borders(Borders::ALL).title("Diff"))
        .scroll((scroll, 0));
    f.render_widget(body, chunks[1]);

    let footer = Paragraph::new("j/k: Scroll | PgUp/PgDn: Page | Esc: Back")
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center);
    f.render_widget(footer, chunks[2]);
}

/// Render the before/after diff of every file a trace touched. Blob
/// contents come from the snapshot store; a missing path means the file
/// did not exist on that side.
fn build_diff_lines(
    repo: &Repository,
    trace: &TraceRecord,
) -> Result<Vec<Line<'static>>, PiTraceError> {
    let mut lines = Vec::new();

    for file in &trace.files {
        let before = repo
            .show_blob(&trace.metadata.before_sha, &file.path)?
            .unwrap_or_default();
        let after = repo
            .show_blob(&trace.metadata.after_sha, &file.path)?
            .unwrap_or_default();

        lines.push(Line::from(Span::styled(
            format!("── {} ──", file.path),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )));

        let diff = TextDiff::from_lines(&before, &after);
        for change in diff.iter_all_changes() {
            let text = change.value().trim_end_matches('\n').to_string();
            let line = match change.tag() {
                ChangeTag::Insert => Line::from(Span::styled(
                    format!("+{}", text),
                    Style::default().fg(Color::Green),
                )),
                ChangeTag::Delete => Line::from(Span::styled(
                    format!("-{}", text),
                    Style::default().fg(Color::Red),
                )),
                ChangeTag::Equal => Line::from(Span::styled(
                    format!(" {}", text),
                    Style::default().fg(Color::DarkGray),
                )),
            };
            lines.push(line);
        }
        lines.push(Line::from(""));
    }

    Ok(lines)
}
