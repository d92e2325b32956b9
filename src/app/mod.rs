use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::api::{ApiOutcome, NotesGateway, RequestRunner};
use crate::config::AppConfig;
use crate::ui;

mod actions;
pub mod state;

use actions::ActionDispatcher;
pub use state::{AppState, AuthView, DraftField, OverlayState, Workspace};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    Refresh,
    NewNote,
    EditNote,
    DeleteNote,
    StartSearch,
    Logout,
}

pub struct App {
    pub config: Arc<AppConfig>,
    runner: RequestRunner,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, gateway: Arc<dyn NotesGateway>) -> Self {
        let preview_lines = config.preview_lines as usize;
        Self {
            config,
            runner: RequestRunner::spawn(gateway),
            state: AppState::new(preview_lines),
            list_state: ListState::default(),
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    self.list_state.select(self.state.selected_index());
                    ui::draw_app(frame, &self.state, &mut self.list_state, &self.config.theme);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Resize(_, _) => {
                        // next draw adapts to the new size
                    }
                    _ => {}
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    /// Drain completed request outcomes. This is the only place server
    /// responses reach the model, so no two applications ever interleave.
    fn on_tick(&mut self) {
        while let Some(outcome) = self.runner.poll() {
            self.apply_outcome(outcome);
        }
    }

    fn apply_outcome(&mut self, outcome: ApiOutcome) {
        let dispatcher = ActionDispatcher::new(&self.runner);
        match outcome {
            ApiOutcome::Register(result) => self.state.apply_register(result),
            ApiOutcome::Login(result) => {
                if self.state.apply_login(result) {
                    // token went absent -> present: fetch the collection
                    dispatcher.refresh(&mut self.state);
                }
            }
            ApiOutcome::Refresh { seq, result } => self.state.apply_refresh(seq, result),
            ApiOutcome::Created(result) => {
                let created = result.is_ok();
                self.state.apply_create(result);
                if created {
                    self.state.set_status_message(Some("Note created"));
                }
            }
            ApiOutcome::Updated { id, result } => {
                let updated = result.is_ok();
                self.state.apply_update(id, result);
                if updated {
                    self.state.set_status_message(Some("Note saved"));
                }
            }
            ApiOutcome::Deleted { id, result } => {
                let deleted = result.is_ok();
                self.state.apply_delete(id, result);
                if deleted {
                    self.state.set_status_message(Some("Note deleted"));
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if !self.state.is_authenticated() {
            self.handle_auth_key(key);
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.is_editing() {
            self.handle_editor_key(key);
            return;
        }

        if self.state.notes.search_active {
            if self.handle_search_key(key) {
                return;
            }
        }

        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Refresh)
            }
            KeyCode::Char('a') if plain(key) => Some(Action::NewNote),
            KeyCode::Char('e') if plain(key) => Some(Action::EditNote),
            KeyCode::Char('d') if plain(key) => Some(Action::DeleteNote),
            KeyCode::Char('/') if plain(key) => Some(Action::StartSearch),
            KeyCode::Char('L') => Some(Action::Logout),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        let dispatcher = ActionDispatcher::new(&self.runner);
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.state.move_selection(1),
            Action::SelectPrevious => self.state.move_selection(-1),
            Action::Refresh => {
                dispatcher.refresh(&mut self.state);
            }
            Action::NewNote => {
                self.state.new_note();
                self.state
                    .set_status_message(Some("New note: Tab switches fields • Ctrl-s saves"));
            }
            Action::EditNote => {
                let Some(id) = self.state.selected_note_id() else {
                    self.state.set_status_message(Some("No note selected"));
                    return;
                };
                self.state.edit_note(id);
                self.state
                    .set_status_message(Some("Editing: Ctrl-s save • Esc cancel"));
            }
            Action::DeleteNote => {
                if self.state.selected_note_id().is_none() {
                    self.state.set_status_message(Some("No note selected"));
                    return;
                }
                self.state.open_delete_overlay();
            }
            Action::StartSearch => self.state.begin_search(),
            Action::Logout => {
                self.state.logout();
                self.state.set_status_message(Some("Logged out"));
            }
        }
    }

    fn handle_auth_key(&mut self, key: KeyEvent) {
        let dispatcher = ActionDispatcher::new(&self.runner);
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.toggle_auth_view();
            }
            KeyCode::Tab | KeyCode::Down => self.state.focus_next_auth_field(),
            KeyCode::Enter => {
                dispatcher.submit_auth(&mut self.state);
            }
            KeyCode::Backspace => self.state.pop_auth_char(),
            KeyCode::Char(ch) if plain(key) => {
                self.state.push_auth_char(ch);
            }
            _ => {}
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        if self.state.delete_overlay().is_none() {
            return false;
        }
        let dispatcher = ActionDispatcher::new(&self.runner);
        match key.code {
            KeyCode::Esc => {
                self.state.close_overlay();
                self.state.set_status_message(Some("Delete canceled"));
            }
            KeyCode::Enter | KeyCode::Char('y') => {
                dispatcher.confirm_delete(&mut self.state);
            }
            _ => {}
        }
        true
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        let dispatcher = ActionDispatcher::new(&self.runner);
        match key.code {
            KeyCode::Esc => {
                if self.state.cancel_search() {
                    dispatcher.refresh(&mut self.state);
                }
                true
            }
            KeyCode::Enter => {
                self.state.finish_search();
                true
            }
            KeyCode::Backspace => {
                if self.state.pop_search_char() {
                    dispatcher.refresh(&mut self.state);
                }
                true
            }
            KeyCode::Char(ch) if plain(key) => {
                if self.state.push_search_char(ch) {
                    dispatcher.refresh(&mut self.state);
                }
                true
            }
            _ => false,
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('s') => {
                    let dispatcher = ActionDispatcher::new(&self.runner);
                    dispatcher.save_draft(&mut self.state);
                    return;
                }
                KeyCode::Char('c') => {
                    self.should_quit = true;
                    return;
                }
                _ => {}
            }
        }

        if key.code == KeyCode::Esc {
            self.state.cancel_edit();
            self.state.set_status_message(Some("Edit canceled"));
            return;
        }

        let Some(draft) = self.state.draft_mut() else {
            return;
        };
        match key.code {
            KeyCode::Tab => draft.toggle_focus(),
            KeyCode::Enter => draft.insert_newline(),
            KeyCode::Backspace => draft.backspace(),
            KeyCode::Delete => draft.delete(),
            KeyCode::Left => draft.move_left(),
            KeyCode::Right => draft.move_right(),
            KeyCode::Up => draft.move_up(),
            KeyCode::Down => draft.move_down(),
            KeyCode::Home => draft.move_home(),
            KeyCode::End => draft.move_end(),
            KeyCode::Char(ch) if plain(key) => {
                draft.insert_char(ch);
            }
            _ => {}
        }
    }
}

fn plain(key: KeyEvent) -> bool {
    !key.modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}
