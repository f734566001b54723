/// Ratatui-based TUI for repochat.
///
/// Architecture:
///   main thread:   event loop over crossterm keyboard events + mpsc UiEvent drain
///   request tasks: one tokio::spawn per remote call, reporting back via UnboundedSender
///
/// Layout:
///   ┌──────────┬─────────────────────────────────────┐
///   │ sidebar  │  transcript (scrollable, Min(0))    │
///   │ (Ctrl+B) ├─────────────────────────────────────┤
///   │          │  status bar (1 line)                │
///   │          ├─────────────────────────────────────┤
///   │          │  quote chip (1 line, when pending)  │
///   │          ├─────────────────────────────────────┤
///   │          │  input box (3 lines, fixed)         │
///   └──────────┴─────────────────────────────────────┘
pub mod render;
pub mod chat;
pub mod overlays;
pub mod sidebar;

use std::io;
use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend, layout::Rect};
use tokio::sync::mpsc;
use tracing::warn;

use crate::client::{RepoService, RepoStats};
use crate::config::ResolvedConfig;
use crate::error::ServiceError;
use crate::selection::SelectionTracker;
use crate::session::{ChatTicket, LoadOutcome, LoadTicket, Navigator, SessionController, StatsView};
use crate::store::{HistoryRecord, HistoryStore, ModelPreference};
use crate::transcript::ChatMessage;
use crate::tree::{DirectoryTree, build_tree};

// ── UiEvent: typed events from request tasks → TUI ──────────────────────────

#[derive(Debug)]
pub enum UiEvent {
    /// A repository load finished
    RepoLoaded {
        ticket: LoadTicket,
        result: Result<RepoStats, ServiceError>,
    },
    /// A chat request finished
    AnswerReady {
        ticket: ChatTicket,
        result: Result<String, ServiceError>,
    },
}

// ── Mode: TUI modal state ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    SlashComplete,  // / inline command autocomplete
    Select,         // Ctrl+S transcript selection for quoting
    HistoryBrowser, // Ctrl+H repository history
    ModelPicker,    // /model without argument
}

// ── Transcript selection ──────────────────────────────────────────────────────

/// Contiguous run of transcript messages, `anchor` fixed and `focus` moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSelection {
    pub anchor: usize,
    pub focus: usize,
}

impl MessageSelection {
    fn at(index: usize) -> Self {
        Self { anchor: index, focus: index }
    }

    pub fn range(&self) -> RangeInclusive<usize> {
        self.anchor.min(self.focus)..=self.anchor.max(self.focus)
    }
}

// ── History browser state ─────────────────────────────────────────────────────

pub struct HistoryBrowserState {
    pub entries: Vec<HistoryRecord>,
    pub selected: usize,
    /// Waiting for `y` to wipe all history
    pub confirm_clear: bool,
}

impl HistoryBrowserState {
    pub fn load(history: &HistoryStore) -> Self {
        Self {
            entries: history.read_all(),
            selected: 0,
            confirm_clear: false,
        }
    }
}

// ── Notice overlay ────────────────────────────────────────────────────────────

/// Modal message dismissed by any key.
pub struct Notice {
    pub title: String,
    pub body: String,
}

// ── AppState ──────────────────────────────────────────────────────────────────

pub struct AppState {
    pub controller: SessionController,
    prefs: ModelPreference,
    /// Active model lives in `resolved.model`
    pub resolved: ResolvedConfig,
    pub cursor: usize,        // byte offset in the pending query
    pub mode: Mode,
    pub scroll: usize,        // lines scrolled up in the transcript
    /// Incremented every 120ms while a request is running
    pub spinner_tick: u32,
    pub sidebar_visible: bool,
    /// One-line feedback shown in the status bar
    pub status: Option<String>,
    pub notice: Option<Notice>,
    pub selection: Option<MessageSelection>,
    pub tracker: SelectionTracker,
    pub history_browser: Option<HistoryBrowserState>,
    pub model_picker_selected: usize,
    /// Selected index in the slash-complete dropdown
    pub slash_complete_selected: usize,
    /// File tree of the last confirmed load
    pub tree: DirectoryTree,
    /// Full terminal area, kept current for selection geometry
    pub screen: Rect,
    navigator: Navigator,
    user_load_in_flight: bool,
}

impl AppState {
    pub fn new(controller: SessionController, prefs: ModelPreference, resolved: ResolvedConfig) -> Self {
        Self {
            controller,
            prefs,
            resolved,
            cursor: 0,
            mode: Mode::Normal,
            scroll: 0,
            spinner_tick: 0,
            sidebar_visible: false, // set after terminal size check in event_loop
            status: None,
            notice: None,
            selection: None,
            tracker: SelectionTracker::default(),
            history_browser: None,
            model_picker_selected: 0,
            slash_complete_selected: 0,
            tree: DirectoryTree::default(),
            screen: Rect::default(),
            navigator: Navigator::default(),
            user_load_in_flight: false,
        }
    }

    pub fn input(&self) -> &str {
        &self.controller.session().pending_query
    }

    pub fn is_busy(&self) -> bool {
        let s = self.controller.session();
        s.is_loading_repo || s.is_loading_answer
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some(msg.into());
    }

    fn apply_event(&mut self, ev: UiEvent) {
        match ev {
            UiEvent::RepoLoaded { ticket, result } => {
                let url = ticket.url.clone();
                match self.controller.finish_load(ticket, result) {
                    LoadOutcome::Loaded { .. } => {
                        self.user_load_in_flight = false;
                        self.refresh_tree();
                        let files = self
                            .controller
                            .session()
                            .stats
                            .as_ref()
                            .map(StatsView::files_count)
                            .unwrap_or(0);
                        self.set_status(format!("✓ {url} ready · {files} files"));
                    }
                    LoadOutcome::Failed(e) => {
                        self.user_load_in_flight = false;
                        self.set_status(format!("✗ load failed: {url}"));
                        self.notice = Some(Notice {
                            title: "Load failed".to_string(),
                            body: format!("Failed to load repository {url}:\n\n{e}"),
                        });
                    }
                    LoadOutcome::Superseded => {}
                }
            }
            UiEvent::AnswerReady { ticket, result } => {
                if self.controller.finish_chat(ticket, result) && self.mode != Mode::Select {
                    self.scroll = 0;
                }
            }
        }
        if self.mode == Mode::Select {
            self.sync_selection();
        }
    }

    fn refresh_tree(&mut self) {
        self.tree = self
            .controller
            .session()
            .stats
            .as_ref()
            .and_then(StatsView::confirmed)
            .and_then(|s| s.file_paths.as_deref())
            .map(build_tree::<String>)
            .unwrap_or_default();
    }

    /// Clear everything view-local that belongs to the previous conversation.
    fn reset_view(&mut self) {
        self.tree = DirectoryTree::default();
        self.selection = None;
        self.tracker.collapse();
        self.scroll = 0;
        self.cursor = 0;
        self.user_load_in_flight = false;
    }

    // ── Session actions ───────────────────────────────────────────────────────

    fn open_repo(&mut self, id: &str, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        let Some(url) = self.navigator.navigate(Some(id)) else {
            if !id.trim().is_empty() {
                self.set_status(format!("{} is already open", id.trim()));
            }
            return;
        };
        self.reset_view();
        if let Some(ticket) = self.controller.activate(&url) {
            self.set_status(format!("opening {url}…"));
            spawn_load(self.controller.service(), ticket, ui_tx.clone());
        }
    }

    fn start_load(&mut self, force_refresh: bool, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        let url = self.controller.session().url.clone();
        if url.is_empty() {
            self.set_status("no repository open · /open owner/name");
            return;
        }
        if self.user_load_in_flight {
            self.set_status("a load is already running");
            return;
        }
        if let Some(ticket) = self.controller.begin_load(&url, force_refresh) {
            self.user_load_in_flight = true;
            self.set_status(if force_refresh {
                "starting fresh re-index…"
            } else {
                "loading repository…"
            });
            spawn_load(self.controller.service(), ticket, ui_tx.clone());
        }
    }

    /// Chat stays closed until the repository has been loaded.
    fn refuse_chat(&mut self) -> bool {
        let session = self.controller.session();
        let reason = if session.url.is_empty() {
            "no repository open · /open owner/name"
        } else if !self.controller.has_confirmed_stats() {
            "repository not loaded yet"
        } else if session.is_loading_answer {
            "waiting for the previous answer…"
        } else {
            return false;
        };
        self.set_status(reason);
        true
    }

    fn send(&mut self, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        if self.refuse_chat() {
            return;
        }
        if let Some(ticket) = self.controller.begin_send(&self.resolved.model) {
            self.cursor = 0;
            self.scroll = 0;
            spawn_chat(self.controller.service(), ticket, ui_tx.clone());
        }
    }

    fn resend_focused(&mut self, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        let Some(sel) = self.selection else {
            return;
        };
        let Some(msg) = self
            .controller
            .session()
            .transcript
            .get(sel.focus)
            .cloned()
            .filter(ChatMessage::is_user)
        else {
            self.set_status("only your own messages can be resent");
            return;
        };
        if self.refuse_chat() {
            return;
        }
        self.leave_select();
        let ticket = self.controller.begin_resend(&msg, &self.resolved.model);
        self.scroll = 0;
        spawn_chat(self.controller.service(), ticket, ui_tx.clone());
    }

    fn new_session(&mut self) {
        self.controller.new_session();
        self.navigator.reset();
        self.reset_view();
        self.set_status("new session");
    }

    fn set_model(&mut self, id: &str) {
        let Some(name) = self
            .resolved
            .models
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.name.clone())
        else {
            self.set_status(format!("unknown model: {id}"));
            return;
        };
        self.resolved.model = id.to_string();
        match self.prefs.save(id) {
            Ok(()) => self.set_status(format!("model → {name}")),
            Err(e) => {
                warn!(error = %e, "failed to save model preference");
                self.set_status(format!("model → {name} (not saved: {e})"));
            }
        }
    }

    fn open_history_browser(&mut self, confirm_clear: bool) {
        let mut browser = HistoryBrowserState::load(self.controller.history());
        browser.confirm_clear = confirm_clear && !browser.entries.is_empty();
        if confirm_clear && browser.entries.is_empty() {
            self.set_status("history is already empty");
        }
        self.history_browser = Some(browser);
        self.mode = Mode::HistoryBrowser;
    }

    fn open_model_picker(&mut self) {
        self.model_picker_selected = self
            .resolved
            .models
            .iter()
            .position(|m| m.id == self.resolved.model)
            .unwrap_or(0);
        self.mode = Mode::ModelPicker;
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    fn enter_select(&mut self) {
        let len = self.controller.session().transcript.len();
        if len == 0 {
            self.set_status("nothing to select yet");
            return;
        }
        self.selection = Some(MessageSelection::at(len - 1));
        self.mode = Mode::Select;
        self.sync_selection();
    }

    fn leave_select(&mut self) {
        self.selection = None;
        self.tracker.collapse();
        self.mode = Mode::Normal;
    }

    /// Report the current selection (text + on-screen bounds) to the tracker.
    fn sync_selection(&mut self) {
        let Some(sel) = self.selection else {
            return;
        };
        let history_area = render::panes(self.screen, self).history;
        self.ensure_visible(sel.focus, history_area);
        let bounds = chat::selection_bounds(self, history_area, sel.range());
        let text = self.selected_text(sel.range());
        self.tracker.observe(&text, bounds);
    }

    fn selected_text(&self, range: RangeInclusive<usize>) -> String {
        let transcript = &self.controller.session().transcript;
        transcript
            .get(range)
            .unwrap_or_default()
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Scroll so that message `index` is on screen.
    fn ensure_visible(&mut self, index: usize, area: Rect) {
        let (total, rows) = chat::message_rows(self, area.width);
        let visible = area.height as usize;
        if total <= visible {
            return;
        }
        let Some(row) = rows.get(index) else {
            return;
        };
        let max_skip = total - visible;
        let skip = max_skip.saturating_sub(self.scroll);
        if row.start < skip {
            self.scroll = max_skip - row.start;
        } else if row.end > skip + visible {
            self.scroll = max_skip.saturating_sub(row.end.saturating_sub(visible));
        }
    }
}

// ── Slash commands ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SlashCommand {
    key: &'static str,
    label: &'static str,
}

fn slash_commands() -> Vec<SlashCommand> {
    vec![
        SlashCommand { key: "/open",          label: "Open a repository (owner/name or GitHub URL)" },
        SlashCommand { key: "/load",          label: "Load the current repository" },
        SlashCommand { key: "/refresh",       label: "Force a fresh re-index" },
        SlashCommand { key: "/new",           label: "Start a new session" },
        SlashCommand { key: "/model",         label: "Pick a model (or /model <id>)" },
        SlashCommand { key: "/history",       label: "Previously opened repositories  (or Ctrl+H)" },
        SlashCommand { key: "/clear-history", label: "Delete all saved history" },
        SlashCommand { key: "/help",          label: "Show help" },
        SlashCommand { key: "/quit",          label: "Quit" },
    ]
}

/// Returns commands whose key or label contains the current input query.
fn slash_filtered(input: &str) -> Vec<SlashCommand> {
    let q = input.to_lowercase();
    slash_commands()
        .into_iter()
        .filter(|c| c.key.contains(q.as_str()) || c.label.to_lowercase().contains(q.as_str()))
        .collect()
}

const HELP_TEXT: &str = "\
/open <repo>     open a repository and restore its conversation
/load            load the current repository
/refresh         force a fresh re-index
/new             start a new session
/model [id]      pick or set the model
/history         previously opened repositories
/clear-history   delete all saved history
/quit            quit

Enter send · Ctrl+B sidebar · Ctrl+H history · Ctrl+X drop quote
Ctrl+S select messages: ↑↓ move · Shift+↑↓ extend · Enter quote
                        r resend your message · Esc cancel";

// ── Request tasks ─────────────────────────────────────────────────────────────

fn spawn_load(service: Arc<dyn RepoService>, ticket: LoadTicket, ui_tx: mpsc::UnboundedSender<UiEvent>) {
    tokio::spawn(async move {
        let result = ticket.execute(service.as_ref()).await;
        let _ = ui_tx.send(UiEvent::RepoLoaded { ticket, result });
    });
}

fn spawn_chat(service: Arc<dyn RepoService>, ticket: ChatTicket, ui_tx: mpsc::UnboundedSender<UiEvent>) {
    tokio::spawn(async move {
        let result = ticket.execute(service.as_ref()).await;
        let _ = ui_tx.send(UiEvent::AnswerReady { ticket, result });
    });
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(
    controller: SessionController,
    prefs: ModelPreference,
    resolved: ResolvedConfig,
    initial_repo: Option<String>,
) -> Result<()> {
    let mut terminal = setup_terminal()?;

    // Panic hook: restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, controller, prefs, resolved, initial_repo).await;

    restore_terminal(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    controller: SessionController,
    prefs: ModelPreference,
    resolved: ResolvedConfig,
    initial_repo: Option<String>,
) -> Result<()> {
    let mut state = AppState::new(controller, prefs, resolved);

    // Auto-show sidebar when terminal is wide enough
    let size = terminal.size()?;
    state.screen = Rect::new(0, 0, size.width, size.height);
    state.sidebar_visible = size.width >= 110;

    // Channel: request tasks → TUI
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();

    if let Some(repo) = initial_repo {
        state.open_repo(&repo, &ui_tx);
    }

    let mut crossterm_events = EventStream::new();
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(120));

    terminal.draw(|f| render::draw(f, &state))?;

    loop {
        tokio::select! {
            // ── Animation tick ────────────────────────────────────────────────
            _ = ticker.tick() => {
                if state.is_busy() {
                    state.spinner_tick = state.spinner_tick.wrapping_add(1);
                    terminal.draw(|f| render::draw(f, &state))?;
                }
            }

            // ── Drain UI events from request tasks ────────────────────────────
            Some(ev) = ui_rx.recv() => {
                state.apply_event(ev);
                terminal.draw(|f| render::draw(f, &state))?;
            }

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(Ok(ev)) = crossterm_events.next() => {
                match ev {
                    Event::Key(key) => {
                        let keep = handle_key(key, &mut state, &ui_tx)?;
                        if !keep { break; }
                    }
                    Event::Resize(w, h) => {
                        state.screen = Rect::new(0, 0, w, h);
                        if state.mode == Mode::Select {
                            state.sync_selection();
                        }
                    }
                    _ => {}
                }
                terminal.draw(|f| render::draw(f, &state))?;
            }
        }
    }

    Ok(())
}

// ── Key handler ───────────────────────────────────────────────────────────────

fn handle_key(
    key: KeyEvent,
    state: &mut AppState,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
) -> Result<bool> {
    // ── Notice overlay: any key dismisses ─────────────────────────────────────
    if state.notice.is_some() {
        state.notice = None;
        return Ok(true);
    }

    // Ctrl+C / Ctrl+D: quit from anywhere
    if key.modifiers == KeyModifiers::CONTROL && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d')) {
        return Ok(false);
    }

    // ── HistoryBrowser mode ───────────────────────────────────────────────────
    if state.mode == Mode::HistoryBrowser {
        let Some(browser) = &mut state.history_browser else {
            state.mode = Mode::Normal;
            return Ok(true);
        };
        if browser.confirm_clear {
            if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                match state.controller.history().clear() {
                    Ok(()) => {
                        browser.entries.clear();
                        browser.selected = 0;
                        state.status = Some("✓ history cleared".to_string());
                    }
                    Err(e) => {
                        state.status = Some(format!("clear failed: {e}"));
                    }
                }
            }
            browser.confirm_clear = false;
            return Ok(true);
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                state.mode = Mode::Normal;
                state.history_browser = None;
            }
            KeyCode::Up => {
                browser.selected = browser.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if browser.selected + 1 < browser.entries.len() {
                    browser.selected += 1;
                }
            }
            KeyCode::Char('c') => {
                browser.confirm_clear = !browser.entries.is_empty();
            }
            KeyCode::Enter => {
                let url = browser.entries.get(browser.selected).map(|r| r.url.clone());
                state.mode = Mode::Normal;
                state.history_browser = None;
                if let Some(url) = url {
                    state.open_repo(&url, ui_tx);
                }
            }
            _ => {}
        }
        return Ok(true);
    }

    // ── ModelPicker mode ──────────────────────────────────────────────────────
    if state.mode == Mode::ModelPicker {
        let count = state.resolved.models.len();
        match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
            }
            KeyCode::Up => {
                if count > 0 {
                    state.model_picker_selected = (state.model_picker_selected + count - 1) % count;
                }
            }
            KeyCode::Down => {
                if count > 0 {
                    state.model_picker_selected = (state.model_picker_selected + 1) % count;
                }
            }
            KeyCode::Enter => {
                state.mode = Mode::Normal;
                if let Some(id) = state.resolved.models.get(state.model_picker_selected).map(|m| m.id.clone()) {
                    state.set_model(&id);
                }
            }
            _ => {}
        }
        return Ok(true);
    }

    // ── Select mode ───────────────────────────────────────────────────────────
    if state.mode == Mode::Select {
        let len = state.controller.session().transcript.len();
        let Some(mut sel) = state.selection else {
            state.mode = Mode::Normal;
            return Ok(true);
        };
        match (key.modifiers, key.code) {
            // Shift+↑/↓: extend from the anchor
            (KeyModifiers::SHIFT, KeyCode::Up) => {
                sel.focus = sel.focus.saturating_sub(1);
            }
            (KeyModifiers::SHIFT, KeyCode::Down) => {
                if sel.focus + 1 < len {
                    sel.focus += 1;
                }
            }
            (_, KeyCode::Up) => {
                sel = MessageSelection::at(sel.focus.saturating_sub(1));
            }
            (_, KeyCode::Down) => {
                if sel.focus + 1 < len {
                    sel = MessageSelection::at(sel.focus + 1);
                }
            }
            (_, KeyCode::Enter) | (_, KeyCode::Char('q')) => {
                if let Some(quote) = state.tracker.confirm() {
                    state.controller.set_pending_quote(Some(quote));
                    state.set_status("❝ quote attached · Ctrl+X to drop");
                }
                state.leave_select();
                return Ok(true);
            }
            (_, KeyCode::Esc) => {
                state.leave_select();
                return Ok(true);
            }
            (_, KeyCode::Char('r')) => {
                state.resend_focused(ui_tx);
                return Ok(true);
            }
            _ => return Ok(true),
        }
        state.selection = Some(sel);
        state.sync_selection();
        return Ok(true);
    }

    // ── SlashComplete mode ────────────────────────────────────────────────────
    if state.mode == Mode::SlashComplete {
        match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
            }
            KeyCode::Up => {
                let count = slash_filtered(state.input()).len();
                if count > 0 {
                    state.slash_complete_selected = (state.slash_complete_selected + count - 1) % count;
                }
            }
            KeyCode::Down => {
                let count = slash_filtered(state.input()).len();
                if count > 0 {
                    state.slash_complete_selected = (state.slash_complete_selected + 1) % count;
                }
            }
            KeyCode::Enter | KeyCode::Tab => {
                let matches = slash_filtered(state.input());
                if let Some(cmd) = matches.get(state.slash_complete_selected) {
                    let input = state.controller.pending_query_mut();
                    *input = cmd.key.to_string();
                    // Commands that take an argument get a trailing space
                    if matches!(cmd.key, "/open" | "/model") {
                        input.push(' ');
                    }
                    state.cursor = input.len();
                }
                state.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                let input = state.controller.pending_query_mut();
                if input.len() <= 1 {
                    // Backspaced past `/`: cancel
                    input.clear();
                    state.cursor = 0;
                    state.mode = Mode::Normal;
                } else {
                    input.pop();
                    state.cursor = input.len();
                    state.slash_complete_selected = 0;
                }
            }
            KeyCode::Char(' ') => {
                // Space ends command-name completion; keep typing the argument
                let input = state.controller.pending_query_mut();
                input.push(' ');
                state.cursor = input.len();
                state.mode = Mode::Normal;
            }
            KeyCode::Char(c) => {
                let input = state.controller.pending_query_mut();
                input.push(c);
                state.cursor = input.len();
                state.slash_complete_selected = 0;
                if !input.starts_with('/') {
                    state.mode = Mode::Normal;
                }
            }
            _ => {}
        }
        return Ok(true);
    }

    // ── Normal mode ───────────────────────────────────────────────────────────
    match (key.modifiers, key.code) {
        // Ctrl+H: open repository history browser
        (KeyModifiers::CONTROL, KeyCode::Char('h')) => {
            state.open_history_browser(false);
        }
        // Ctrl+B: toggle sidebar
        (KeyModifiers::CONTROL, KeyCode::Char('b')) => {
            state.sidebar_visible = !state.sidebar_visible;
        }
        // Ctrl+S: select transcript messages for quoting
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => {
            state.enter_select();
        }
        // Ctrl+X: drop the pending quote
        (KeyModifiers::CONTROL, KeyCode::Char('x')) => {
            if state.controller.session().pending_quote.is_some() {
                state.controller.set_pending_quote(None);
                state.set_status("quote dropped");
            }
        }
        // Enter: submit input
        (KeyModifiers::NONE, KeyCode::Enter) => {
            let input = state.input().trim().to_string();
            if input.starts_with('/') {
                state.controller.pending_query_mut().clear();
                state.cursor = 0;
                return execute_command(&input, state, ui_tx);
            }
            if !input.is_empty() {
                state.send(ui_tx);
            }
        }
        // Backspace: remove char before cursor
        (KeyModifiers::NONE, KeyCode::Backspace) => {
            input_backspace(state.controller.pending_query_mut(), &mut state.cursor);
        }
        // Delete: remove char at cursor
        (KeyModifiers::NONE, KeyCode::Delete) => {
            input_delete_forward(state.controller.pending_query_mut(), &mut state.cursor);
        }
        // Ctrl+Backspace / Ctrl+W: delete word before cursor
        (KeyModifiers::CONTROL, KeyCode::Backspace) | (KeyModifiers::CONTROL, KeyCode::Char('w')) => {
            input_delete_word(state.controller.pending_query_mut(), &mut state.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Left) => {
            state.cursor = prev_char_boundary(state.input(), state.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Right) => {
            state.cursor = next_char_boundary(state.input(), state.cursor);
        }
        (KeyModifiers::CONTROL, KeyCode::Left) => {
            state.cursor = word_left(state.input(), state.cursor);
        }
        (KeyModifiers::CONTROL, KeyCode::Right) => {
            state.cursor = word_right(state.input(), state.cursor);
        }
        // Home / Ctrl+A: start of input
        (KeyModifiers::NONE, KeyCode::Home) | (KeyModifiers::CONTROL, KeyCode::Char('a')) => {
            state.cursor = 0;
        }
        // End / Ctrl+E: end of input
        (KeyModifiers::NONE, KeyCode::End) | (KeyModifiers::CONTROL, KeyCode::Char('e')) => {
            state.cursor = state.input().len();
        }
        // Ctrl+U: clear line before cursor
        (KeyModifiers::CONTROL, KeyCode::Char('u')) => {
            let cursor = state.cursor;
            state.controller.pending_query_mut().drain(..cursor);
            state.cursor = 0;
        }
        // Ctrl+K: clear from cursor to end
        (KeyModifiers::CONTROL, KeyCode::Char('k')) => {
            let cursor = state.cursor;
            state.controller.pending_query_mut().truncate(cursor);
        }
        (KeyModifiers::NONE, KeyCode::Up) => {
            state.scroll = state.scroll.saturating_add(3);
        }
        (KeyModifiers::NONE, KeyCode::Down) => {
            state.scroll = state.scroll.saturating_sub(3);
        }
        (KeyModifiers::NONE, KeyCode::PageUp) => {
            state.scroll = state.scroll.saturating_add(15);
        }
        (KeyModifiers::NONE, KeyCode::PageDown) => {
            state.scroll = state.scroll.saturating_sub(15);
        }
        // Regular char input: insert at cursor
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => {
            let mut buf = [0u8; 4];
            let s = c.encode_utf8(&mut buf);
            let cursor = state.cursor;
            state.controller.pending_query_mut().insert_str(cursor, s);
            state.cursor += s.len();

            // `/` at start of input triggers slash autocomplete
            if c == '/' && state.cursor == 1 {
                state.slash_complete_selected = 0;
                state.mode = Mode::SlashComplete;
            }
        }
        _ => {}
    }

    Ok(true)
}

// ── Slash command handler ─────────────────────────────────────────────────────

fn execute_command(
    input: &str,
    state: &mut AppState,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
) -> Result<bool> {
    let (cmd, arg) = match input.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };
    match cmd {
        "/quit" | "/exit" | "/q" => {
            return Ok(false);
        }
        "/help" | "/h" => {
            state.notice = Some(Notice {
                title: "Help".to_string(),
                body: HELP_TEXT.to_string(),
            });
        }
        "/open" => {
            if arg.is_empty() {
                state.set_status("usage: /open owner/name");
            } else {
                state.open_repo(arg, ui_tx);
            }
        }
        "/load" => state.start_load(false, ui_tx),
        "/refresh" => state.start_load(true, ui_tx),
        "/new" => state.new_session(),
        "/model" => {
            if arg.is_empty() {
                state.open_model_picker();
            } else {
                state.set_model(arg);
            }
        }
        "/history" => state.open_history_browser(false),
        "/clear-history" => state.open_history_browser(true),
        other => {
            state.set_status(format!("unknown command: {other}  (/help)"));
        }
    }
    Ok(true)
}

// ── Input editing helpers ─────────────────────────────────────────────────────

/// Remove the character immediately before the cursor (UTF-8 safe).
fn input_backspace(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let prev = prev_char_boundary(input, *cursor);
    input.drain(prev..*cursor);
    *cursor = prev;
}

/// Delete the character at the cursor position.
fn input_delete_forward(input: &mut String, cursor: &mut usize) {
    if *cursor >= input.len() {
        return;
    }
    let next = next_char_boundary(input, *cursor);
    input.drain(*cursor..next);
}

/// Delete the word immediately before the cursor.
fn input_delete_word(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let start = word_left(input, *cursor);
    input.drain(start..*cursor);
    *cursor = start;
}

fn prev_char_boundary(s: &str, pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let mut p = pos - 1;
    while !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

fn next_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut p = pos + 1;
    while p <= s.len() && !s.is_char_boundary(p) {
        p += 1;
    }
    p.min(s.len())
}

/// Jump to the start of the previous word (skip trailing spaces, then the word).
fn word_left(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    while pos > 0 && bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    while pos > 0 && !bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    pos
}

/// Jump past the end of the next word to the right.
fn word_right(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    let len = s.len();
    while pos < len && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    while pos < len && !bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::config::ConfigFile;
    use crate::store::MemoryStore;

    /// Never answers successfully; these tests only look at local state.
    struct OfflineService;

    #[async_trait]
    impl RepoService for OfflineService {
        async fn load_repository(&self, _url: &str, _force: bool) -> Result<RepoStats, ServiceError> {
            Err(ServiceError::api(503, "offline"))
        }

        async fn ask_question(&self, _prompt: &str, _model: &str) -> Result<String, ServiceError> {
            Err(ServiceError::api(503, "offline"))
        }
    }

    fn app() -> (AppState, mpsc::UnboundedSender<UiEvent>, mpsc::UnboundedReceiver<UiEvent>) {
        let kv: Arc<dyn crate::store::KeyValueStore> = Arc::new(MemoryStore::default());
        let history = HistoryStore::new(kv.clone());
        history.record_load("o/r", 3, Utc::now()).unwrap();
        history
            .update_transcript("o/r", &[ChatMessage::user("what is this?"), ChatMessage::bot("a demo")])
            .unwrap();
        let controller = SessionController::new(Arc::new(OfflineService), history);
        let resolved = ResolvedConfig::resolve(&ConfigFile::default(), None, None, None);
        let mut state = AppState::new(controller, ModelPreference::new(kv), resolved);
        state.screen = Rect::new(0, 0, 100, 40);
        let (tx, rx) = mpsc::unbounded_channel();
        (state, tx, rx)
    }

    fn key(modifiers: KeyModifiers, code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn loaded_stats(paths: &[&str]) -> RepoStats {
        RepoStats {
            files_count: paths.len() as u64,
            chunks_count: crate::client::ChunksCount::Count(8),
            summary: Some("ok".to_string()),
            file_paths: Some(paths.iter().map(|p| p.to_string()).collect()),
        }
    }

    /// Confirm the open repository as if its load had come back.
    fn confirm_load(state: &mut AppState, paths: &[&str]) {
        let url = state.controller.session().url.clone();
        let ticket = state.controller.begin_load(&url, false).unwrap();
        state.apply_event(UiEvent::RepoLoaded { ticket, result: Ok(loaded_stats(paths)) });
    }

    #[tokio::test]
    async fn test_open_same_repo_twice_activates_once() {
        let (mut state, tx, _rx) = app();
        state.open_repo("o/r", &tx);
        assert_eq!(state.controller.session().transcript.len(), 2);
        state.controller.pending_query_mut().push_str("draft");

        state.open_repo("o/r", &tx);
        assert_eq!(state.input(), "draft");
        assert!(state.status.as_deref().unwrap_or_default().contains("already open"));

        state.new_session();
        state.open_repo("o/r", &tx);
        assert!(state.input().is_empty());
    }

    #[tokio::test]
    async fn test_select_and_confirm_sets_quote() {
        let (mut state, tx, _rx) = app();
        state.open_repo("o/r", &tx);

        handle_key(key(KeyModifiers::CONTROL, KeyCode::Char('s')), &mut state, &tx).unwrap();
        assert_eq!(state.mode, Mode::Select);
        assert_eq!(state.tracker.captured(), Some("a demo"));
        assert!(state.tracker.affordance().is_some());

        handle_key(key(KeyModifiers::SHIFT, KeyCode::Up), &mut state, &tx).unwrap();
        assert_eq!(state.tracker.captured(), Some("what is this?\n\na demo"));

        handle_key(key(KeyModifiers::NONE, KeyCode::Enter), &mut state, &tx).unwrap();
        assert_eq!(state.mode, Mode::Normal);
        assert_eq!(
            state.controller.session().pending_quote.as_deref(),
            Some("what is this?\n\na demo")
        );
        assert!(state.tracker.affordance().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_selection_keeps_existing_quote() {
        let (mut state, tx, _rx) = app();
        state.open_repo("o/r", &tx);
        state.controller.set_pending_quote(Some("earlier".to_string()));

        handle_key(key(KeyModifiers::CONTROL, KeyCode::Char('s')), &mut state, &tx).unwrap();
        handle_key(key(KeyModifiers::NONE, KeyCode::Esc), &mut state, &tx).unwrap();
        assert_eq!(state.mode, Mode::Normal);
        assert!(state.tracker.captured().is_none());
        assert_eq!(state.controller.session().pending_quote.as_deref(), Some("earlier"));
    }

    #[tokio::test]
    async fn test_resend_from_select_mode_appends_verbatim() {
        let (mut state, tx, _rx) = app();
        state.open_repo("o/r", &tx);
        confirm_load(&mut state, &[]);
        handle_key(key(KeyModifiers::CONTROL, KeyCode::Char('s')), &mut state, &tx).unwrap();

        // focus is on the bot reply: refused
        handle_key(key(KeyModifiers::NONE, KeyCode::Char('r')), &mut state, &tx).unwrap();
        assert_eq!(state.controller.session().transcript.len(), 2);

        handle_key(key(KeyModifiers::NONE, KeyCode::Up), &mut state, &tx).unwrap();
        handle_key(key(KeyModifiers::NONE, KeyCode::Char('r')), &mut state, &tx).unwrap();
        let t = &state.controller.session().transcript;
        assert_eq!(t.len(), 3);
        assert_eq!(t[2], ChatMessage::user("what is this?"));
        assert!(state.controller.session().is_loading_answer);
        assert_eq!(state.mode, Mode::Normal);
    }

    #[tokio::test]
    async fn test_send_waits_for_confirmed_load() {
        let (mut state, tx, _rx) = app();
        state.controller.pending_query_mut().push_str("hello");
        handle_key(key(KeyModifiers::NONE, KeyCode::Enter), &mut state, &tx).unwrap();
        assert_eq!(state.input(), "hello");
        assert!(state.controller.session().transcript.is_empty());

        state.open_repo("o/r", &tx);
        state.controller.pending_query_mut().push_str("hello");
        handle_key(key(KeyModifiers::NONE, KeyCode::Enter), &mut state, &tx).unwrap();
        assert_eq!(state.input(), "hello");
        assert_eq!(state.controller.session().transcript.len(), 2);
        assert_eq!(state.status.as_deref(), Some("repository not loaded yet"));

        confirm_load(&mut state, &[]);
        handle_key(key(KeyModifiers::NONE, KeyCode::Enter), &mut state, &tx).unwrap();
        assert!(state.input().is_empty());
        let t = &state.controller.session().transcript;
        assert_eq!(t.len(), 3);
        assert_eq!(t[2], ChatMessage::user("hello"));
        assert_eq!(state.controller.history().find("o/r").unwrap().transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_successful_load_builds_tree_and_status() {
        let (mut state, tx, _rx) = app();
        state.open_repo("o/r", &tx);
        assert!(state.tree.is_empty());

        confirm_load(&mut state, &["src/main.rs", "src/tui/mod.rs", "README.md"]);
        assert_eq!(state.tree.leaf_count(), 3);
        assert!(state.notice.is_none());
        assert!(state.controller.has_confirmed_stats());
        assert!(state.status.as_deref().unwrap_or_default().contains("3 files"));
        // Restored transcript is non-empty: no summary appended
        assert_eq!(state.controller.session().transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_opens_notice_and_allows_retry() {
        let (mut state, tx, mut rx) = app();
        state.open_repo("o/r", &tx);
        assert!(execute_command("/load", &mut state, &tx).unwrap());
        assert!(state.user_load_in_flight);
        assert!(execute_command("/load", &mut state, &tx).unwrap());
        assert_eq!(state.status.as_deref(), Some("a load is already running"));

        // Activation load and user load both fail; the older one is superseded
        for _ in 0..2 {
            let ev = rx.recv().await.unwrap();
            state.apply_event(ev);
        }
        let notice = state.notice.as_ref().unwrap();
        assert_eq!(notice.title, "Load failed");
        assert!(notice.body.contains("offline"));
        assert!(!state.user_load_in_flight);
        let s = state.controller.session();
        assert_eq!(s.transcript.len(), 2);
        assert_eq!(s.stats, Some(StatsView::Speculative { files_count: 3 }));

        assert!(execute_command("/load", &mut state, &tx).unwrap());
        assert_eq!(state.status.as_deref(), Some("loading repository…"));
    }

    #[tokio::test]
    async fn test_superseded_load_changes_nothing() {
        let (mut state, tx, _rx) = app();
        state.open_repo("o/r", &tx);
        let stale = state.controller.begin_load("o/r", false).unwrap();
        let _latest = state.controller.begin_load("o/r", false).unwrap();
        let status = state.status.clone();

        state.apply_event(UiEvent::RepoLoaded {
            ticket: stale,
            result: Ok(loaded_stats(&["a.rs"])),
        });
        assert!(state.notice.is_none());
        assert_eq!(state.status, status);
        assert!(state.tree.is_empty());
        assert!(state.controller.session().is_loading_repo);

        let stale = state.controller.begin_load("o/r", false).unwrap();
        let _latest = state.controller.begin_load("o/r", false).unwrap();
        state.apply_event(UiEvent::RepoLoaded {
            ticket: stale,
            result: Err(ServiceError::api(500, "boom")),
        });
        assert!(state.notice.is_none());
        assert_eq!(state.status, status);
    }

    #[tokio::test]
    async fn test_slash_command_dispatch() {
        let (mut state, tx, _rx) = app();
        assert!(execute_command("/model gpt-4o", &mut state, &tx).unwrap());
        assert_eq!(state.resolved.model, "gpt-4o");
        assert!(execute_command("/model nope", &mut state, &tx).unwrap());
        assert_eq!(state.resolved.model, "gpt-4o");

        assert!(execute_command("/load", &mut state, &tx).unwrap());
        assert!(state.status.as_deref().unwrap_or_default().contains("no repository"));

        assert!(execute_command("/history", &mut state, &tx).unwrap());
        assert_eq!(state.mode, Mode::HistoryBrowser);
        assert_eq!(state.history_browser.as_ref().unwrap().entries.len(), 1);

        assert!(!execute_command("/quit", &mut state, &tx).unwrap());
    }

    #[tokio::test]
    async fn test_clear_history_needs_confirmation() {
        let (mut state, tx, _rx) = app();
        execute_command("/clear-history", &mut state, &tx).unwrap();
        assert!(state.history_browser.as_ref().unwrap().confirm_clear);

        handle_key(key(KeyModifiers::NONE, KeyCode::Char('n')), &mut state, &tx).unwrap();
        assert_eq!(state.controller.history().read_all().len(), 1);

        handle_key(key(KeyModifiers::NONE, KeyCode::Char('c')), &mut state, &tx).unwrap();
        handle_key(key(KeyModifiers::NONE, KeyCode::Char('y')), &mut state, &tx).unwrap();
        assert!(state.controller.history().read_all().is_empty());
    }

    #[test]
    fn test_selection_range_is_ordered() {
        let sel = MessageSelection { anchor: 4, focus: 1 };
        assert_eq!(sel.range(), 1..=4);
        assert_eq!(MessageSelection::at(2).range(), 2..=2);
    }

    #[test]
    fn test_slash_filter() {
        let keys: Vec<&str> = slash_filtered("/re").iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["/refresh"]);
        assert_eq!(slash_filtered("/").len(), slash_commands().len());
    }

    #[test]
    fn test_input_helpers_are_utf8_safe() {
        let mut s = "héllo wörld".to_string();
        let mut cursor = s.len();
        input_backspace(&mut s, &mut cursor);
        assert_eq!(s, "héllo wörl");
        input_delete_word(&mut s, &mut cursor);
        assert_eq!(s, "héllo ");
        assert_eq!(prev_char_boundary("é", 2), 0);
        assert_eq!(next_char_boundary("é", 0), 2);
        assert_eq!(word_left("foo bar", 7), 4);
        assert_eq!(word_right("foo bar", 0), 3);
    }
}
