use {
    crate::state::Snapshot,
    crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers},
    ratatui::{backend::CrosstermBackend, Terminal},
    std::{
        io::{self, Stdout},
        time::Duration,
    },
    tokio::{sync::watch, time::interval},
    tokio_util::sync::CancellationToken,
};

/// How often pending keyboard input is drained
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Alternate-screen terminal owned by the render loop.
///
/// Restores the terminal on [`TerminalUi::leave`] or, failing that, on drop.
pub struct TerminalUi {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    active: bool,
}

impl TerminalUi {
    pub fn enter() -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;

        // Alternate screen keeps stderr logging from tearing the table
        crossterm::execute!(
            io::stdout(),
            crossterm::terminal::EnterAlternateScreen,
            crossterm::cursor::Hide
        )?;

        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        terminal.clear()?;

        Ok(Self {
            terminal,
            active: true,
        })
    }

    pub fn draw(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.terminal
            .draw(|f| super::layout::render_layout(f, f.size(), snapshot))?;
        Ok(())
    }

    /// Restore the terminal. Safe to call more than once.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        crossterm::execute!(
            io::stdout(),
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;
        crossterm::terminal::disable_raw_mode()
    }
}

impl Drop for TerminalUi {
    fn drop(&mut self) {
        if let Err(e) = self.leave() {
            log::error!("Failed to restore terminal: {}", e);
        }
    }
}

/// Run the render loop until `shutdown` fires or the snapshot source closes.
///
/// Redraws on every published snapshot and on terminal resize. `q`, Esc and
/// Ctrl-C (raw mode swallows SIGINT) cancel `shutdown`.
pub async fn run_ui(
    ui: &mut TerminalUi,
    mut snapshots: watch::Receiver<Snapshot>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let mut current = snapshots.borrow_and_update().clone();
    ui.draw(&current)?;

    let mut input_poll = interval(INPUT_POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            changed = snapshots.changed() => {
                if changed.is_err() {
                    log::info!("Snapshot source closed, leaving UI");
                    break;
                }
                current = snapshots.borrow_and_update().clone();
                ui.draw(&current)?;
            }

            _ = input_poll.tick() => {
                while crossterm::event::poll(Duration::ZERO)? {
                    match crossterm::event::read()? {
                        Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => shutdown.cancel(),
                            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                                shutdown.cancel()
                            }
                            _ => {}
                        },
                        Event::Resize(_, _) => ui.draw(&current)?,
                        _ => {}
                    }
                }
            }
        }
    }

    Ok(())
}
