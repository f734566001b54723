/// Session controller: owns the active repository conversation.
///
/// Phases per active repository:
///   Idle ──load──▶ LoadingInitial ──ok──▶ Ready ──load──▶ LoadingRefresh ──ok──▶ Ready
/// A failed load falls back to where it started (Idle or Ready).
///
/// Remote calls are split into a synchronous `begin_*` step that updates
/// state and hands out a ticket, and a synchronous `finish_*` step that
/// applies the response. The TUI runs the call itself in a spawned task so
/// the event loop never blocks; `load` / `send` / `resend` wrap all three
/// steps for callers that can simply await.
///
/// Tickets are fenced: a load response is applied only if it belongs to the
/// newest load of the current session, and a chat answer only if the
/// session has not been reset or switched since it was asked.
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::client::{RepoService, RepoStats};
use crate::compose;
use crate::error::ServiceError;
use crate::store::HistoryStore;
use crate::transcript::ChatMessage;

// ── Session state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    LoadingInitial,
    Ready,
    LoadingRefresh,
}

/// Repository stats in two phases: restored from history (possibly stale)
/// or confirmed by a remote load.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsView {
    Speculative { files_count: u64 },
    Confirmed(RepoStats),
}

impl StatsView {
    pub fn files_count(&self) -> u64 {
        match self {
            StatsView::Speculative { files_count } => *files_count,
            StatsView::Confirmed(stats) => stats.files_count,
        }
    }

    pub fn confirmed(&self) -> Option<&RepoStats> {
        match self {
            StatsView::Confirmed(stats) => Some(stats),
            StatsView::Speculative { .. } => None,
        }
    }

    pub fn is_speculative(&self) -> bool {
        matches!(self, StatsView::Speculative { .. })
    }
}

/// In-memory state of the active conversation. Never persisted directly;
/// it is projected into and out of a `HistoryRecord`.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub url: String,
    pub stats: Option<StatsView>,
    pub transcript: Vec<ChatMessage>,
    pub pending_query: String,
    pub pending_quote: Option<String>,
    pub is_loading_repo: bool,
    pub is_loading_answer: bool,
    pub phase: Phase,
}

// ── Tickets ───────────────────────────────────────────────────────────────────

/// An issued repository load.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub url: String,
    pub force_refresh: bool,
    token: u64,
    epoch: u64,
}

impl LoadTicket {
    pub async fn execute(&self, service: &dyn RepoService) -> Result<RepoStats, ServiceError> {
        service.load_repository(&self.url, self.force_refresh).await
    }
}

/// An issued chat request.
#[derive(Debug, Clone)]
pub struct ChatTicket {
    pub prompt: String,
    pub model: String,
    epoch: u64,
}

impl ChatTicket {
    pub async fn execute(&self, service: &dyn RepoService) -> Result<String, ServiceError> {
        service.ask_question(&self.prompt, &self.model).await
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    /// Stats confirmed and history updated; `appended` is true when a
    /// summary message was added to the transcript.
    Loaded { appended: bool },
    /// The load failed; session state is unchanged apart from the phase.
    Failed(ServiceError),
    /// A newer load or a session switch made this response stale. Dropped.
    Superseded,
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct SessionController {
    session: Session,
    service: Arc<dyn RepoService>,
    history: HistoryStore,
    /// Bumped whenever the session is reset or switched to another repository.
    epoch: u64,
    next_token: u64,
    /// Token of the newest load still awaiting its response.
    latest_load: Option<u64>,
    answers_in_flight: usize,
}

impl SessionController {
    pub fn new(service: Arc<dyn RepoService>, history: HistoryStore) -> Self {
        Self {
            session: Session::default(),
            service,
            history,
            epoch: 0,
            next_token: 0,
            latest_load: None,
            answers_in_flight: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn service(&self) -> Arc<dyn RepoService> {
        self.service.clone()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// The input buffer, edited in place by the UI.
    pub fn pending_query_mut(&mut self) -> &mut String {
        &mut self.session.pending_query
    }

    pub fn set_pending_quote(&mut self, quote: Option<String>) {
        self.session.pending_quote = quote.filter(|q| !q.trim().is_empty());
    }

    // ── Activation / reset ────────────────────────────────────────────────────

    /// Make `url` the active repository. Restores the transcript and a
    /// speculative file count from history when a record exists, then always
    /// issues a fresh load.
    pub fn activate(&mut self, url: &str) -> Option<LoadTicket> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        self.switch_to(url);
        self.begin_load(url, false)
    }

    /// Forget the active repository and conversation. History is untouched.
    pub fn new_session(&mut self) {
        self.reset();
        info!("new session");
    }

    fn reset(&mut self) {
        self.session = Session::default();
        self.epoch += 1;
        self.latest_load = None;
        self.answers_in_flight = 0;
    }

    fn switch_to(&mut self, url: &str) {
        self.reset();
        self.session.url = url.to_string();
        if let Some(record) = self.history.find(url) {
            debug!(url, messages = record.transcript.len(), "restored session from history");
            self.session.transcript = record.transcript;
            self.session.stats = Some(StatsView::Speculative { files_count: record.file_count });
        }
    }

    // ── Repository load ───────────────────────────────────────────────────────

    /// Start loading `url`. A different url than the active one switches the
    /// session to it first. Blank urls are ignored.
    pub fn begin_load(&mut self, url: &str, force_refresh: bool) -> Option<LoadTicket> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        if self.session.url != url {
            self.switch_to(url);
        }

        self.next_token += 1;
        let token = self.next_token;
        self.latest_load = Some(token);
        self.session.is_loading_repo = true;
        self.session.phase = if self.has_confirmed_stats() {
            Phase::LoadingRefresh
        } else {
            Phase::LoadingInitial
        };
        info!(url, force_refresh, token, "loading repository");

        Some(LoadTicket {
            url: url.to_string(),
            force_refresh,
            token,
            epoch: self.epoch,
        })
    }

    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<RepoStats, ServiceError>) -> LoadOutcome {
        if ticket.epoch != self.epoch || self.latest_load != Some(ticket.token) {
            debug!(url = %ticket.url, token = ticket.token, "dropping superseded load response");
            return LoadOutcome::Superseded;
        }
        self.latest_load = None;
        self.session.is_loading_repo = false;

        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                warn!(url = %ticket.url, error = %e, "repository load failed");
                self.session.phase = if self.has_confirmed_stats() { Phase::Ready } else { Phase::Idle };
                return LoadOutcome::Failed(e);
            }
        };

        info!(url = %ticket.url, files = stats.files_count, "repository loaded");
        let summary = stats.summary().map(str::to_string);
        if let Err(e) = self.history.record_load(&ticket.url, stats.files_count, Utc::now()) {
            warn!(url = %ticket.url, error = %e, "failed to record load in history");
        }
        self.session.stats = Some(StatsView::Confirmed(stats));
        self.session.phase = Phase::Ready;

        let message = match summary {
            Some(s) if self.session.transcript.is_empty() => Some(compose::analysis_complete(&s)),
            Some(s) if ticket.force_refresh => Some(compose::updated_analysis(&s)),
            _ => None,
        };
        let appended = message.is_some();
        match message {
            Some(text) => self.append(ChatMessage::bot(text)),
            // Covers messages sent before the record existed
            None => self.write_back(),
        }
        LoadOutcome::Loaded { appended }
    }

    pub async fn load(&mut self, url: &str, force_refresh: bool) -> Option<LoadOutcome> {
        let ticket = self.begin_load(url, force_refresh)?;
        let result = ticket.execute(self.service.as_ref()).await;
        Some(self.finish_load(ticket, result))
    }

    /// True once a remote load of the active repository has succeeded.
    pub fn has_confirmed_stats(&self) -> bool {
        self.session.stats.as_ref().is_some_and(|s| s.confirmed().is_some())
    }

    // ── Chat ──────────────────────────────────────────────────────────────────

    /// Compose the pending query (and quote) into a user message and start
    /// the chat call. Blank queries are ignored.
    pub fn begin_send(&mut self, model: &str) -> Option<ChatTicket> {
        if self.session.pending_query.trim().is_empty() {
            return None;
        }
        let prompt = compose::compose(&self.session.pending_query, self.session.pending_quote.as_deref());
        self.session.pending_query.clear();
        self.session.pending_quote = None;
        self.append(ChatMessage::user(prompt.clone()));
        Some(self.start_chat(prompt, model))
    }

    /// Re-append `message` verbatim and ask again with its text. Leaves the
    /// pending query and quote alone.
    pub fn begin_resend(&mut self, message: &ChatMessage, model: &str) -> ChatTicket {
        self.append(message.clone());
        self.start_chat(message.text.clone(), model)
    }

    fn start_chat(&mut self, prompt: String, model: &str) -> ChatTicket {
        self.answers_in_flight += 1;
        self.session.is_loading_answer = true;
        info!(model, chars = prompt.len(), "asking question");
        ChatTicket {
            prompt,
            model: model.to_string(),
            epoch: self.epoch,
        }
    }

    /// Append the answer, or a bot-authored error notice. Returns false when
    /// the answer belongs to a session that no longer exists.
    pub fn finish_chat(&mut self, ticket: ChatTicket, result: Result<String, ServiceError>) -> bool {
        if ticket.epoch != self.epoch {
            debug!("dropping answer for a previous session");
            return false;
        }
        self.answers_in_flight = self.answers_in_flight.saturating_sub(1);
        self.session.is_loading_answer = self.answers_in_flight > 0;

        let text = match result {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "chat request failed");
                compose::error_notice(&e.to_string())
            }
        };
        self.append(ChatMessage::bot(text));
        true
    }

    pub async fn send(&mut self, model: &str) -> bool {
        let Some(ticket) = self.begin_send(model) else {
            return false;
        };
        let result = ticket.execute(self.service.as_ref()).await;
        self.finish_chat(ticket, result)
    }

    pub async fn resend(&mut self, message: &ChatMessage, model: &str) -> bool {
        let ticket = self.begin_resend(message, model);
        let result = ticket.execute(self.service.as_ref()).await;
        self.finish_chat(ticket, result)
    }

    // ── Transcript write-back ─────────────────────────────────────────────────

    fn append(&mut self, message: ChatMessage) {
        self.session.transcript.push(message);
        self.write_back();
    }

    /// Best-effort: only repositories that already have a history record get
    /// their transcript saved.
    fn write_back(&self) {
        if self.session.url.is_empty() || self.session.transcript.is_empty() {
            return;
        }
        if let Err(e) = self.history.update_transcript(&self.session.url, &self.session.transcript) {
            warn!(url = %self.session.url, error = %e, "transcript write-back failed");
        }
    }
}

// ── Navigation ────────────────────────────────────────────────────────────────

/// Turns a navigation parameter into at most one activation per distinct value.
#[derive(Debug, Default)]
pub struct Navigator {
    last: Option<String>,
}

impl Navigator {
    pub fn navigate(&mut self, param: Option<&str>) -> Option<String> {
        let value = param.map(str::trim).filter(|s| !s.is_empty())?;
        if self.last.as_deref() == Some(value) {
            return None;
        }
        self.last = Some(value.to_string());
        Some(value.to_string())
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::client::ChunksCount;
    use crate::store::{HistoryStore, MemoryStore};
    use crate::transcript::Role;

    /// Scripted service: pops one prepared response per call.
    #[derive(Default)]
    struct FakeService {
        loads: Mutex<VecDeque<Result<RepoStats, ServiceError>>>,
        answers: Mutex<VecDeque<Result<String, ServiceError>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl FakeService {
        fn with_load(self, r: Result<RepoStats, ServiceError>) -> Self {
            self.loads.lock().unwrap().push_back(r);
            self
        }

        fn with_answer(self, r: Result<String, ServiceError>) -> Self {
            self.answers.lock().unwrap().push_back(r);
            self
        }
    }

    #[async_trait]
    impl RepoService for FakeService {
        async fn load_repository(&self, _url: &str, _force: bool) -> Result<RepoStats, ServiceError> {
            self.loads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::api(500, "no scripted load")))
        }

        async fn ask_question(&self, prompt: &str, model: &str) -> Result<String, ServiceError> {
            self.prompts.lock().unwrap().push((prompt.to_string(), model.to_string()));
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::api(500, "no scripted answer")))
        }
    }

    fn stats(files: u64, summary: Option<&str>) -> RepoStats {
        RepoStats {
            files_count: files,
            chunks_count: ChunksCount::Count(12),
            summary: summary.map(str::to_string),
            file_paths: None,
        }
    }

    fn controller(service: FakeService) -> (SessionController, Arc<FakeService>, HistoryStore) {
        let service = Arc::new(service);
        let history = HistoryStore::new(Arc::new(MemoryStore::default()));
        let c = SessionController::new(service.clone(), history.clone());
        (c, service, history)
    }

    #[tokio::test]
    async fn test_first_load_appends_summary() {
        let (mut c, _, history) = controller(FakeService::default().with_load(Ok(stats(3, Some("ok")))));
        let outcome = c.load("octocat/demo", false).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { appended: true }));

        let s = c.session();
        assert_eq!(s.transcript.len(), 1);
        assert_eq!(s.transcript[0].role, Role::Bot);
        assert!(s.transcript[0].text.contains("ok"));
        assert_eq!(s.phase, Phase::Ready);
        assert!(!s.is_loading_repo);
        assert_eq!(s.stats.as_ref().map(StatsView::files_count), Some(3));

        let rec = history.find("octocat/demo").unwrap();
        assert_eq!(rec.file_count, 3);
        assert_eq!(rec.transcript, s.transcript);
    }

    #[tokio::test]
    async fn test_reload_without_refresh_appends_nothing() {
        let (mut c, _, _) = controller(
            FakeService::default()
                .with_load(Ok(stats(3, Some("ok"))))
                .with_load(Ok(stats(4, Some("ok again")))),
        );
        c.load("o/r", false).await;
        c.load("o/r", false).await;
        assert_eq!(c.session().transcript.len(), 1);
        assert_eq!(c.session().stats.as_ref().map(StatsView::files_count), Some(4));
    }

    #[tokio::test]
    async fn test_forced_refresh_appends_updated_analysis() {
        let (mut c, _, _) = controller(
            FakeService::default()
                .with_load(Ok(stats(3, Some("v1"))))
                .with_load(Ok(stats(5, Some("v2")))),
        );
        c.load("o/r", false).await;
        let before = c.session().transcript.len();
        let ticket = c.begin_load("o/r", true).unwrap();
        assert_eq!(c.session().phase, Phase::LoadingRefresh);
        let result = ticket.execute(c.service().as_ref()).await;
        c.finish_load(ticket, result);

        let t = &c.session().transcript;
        assert_eq!(t.len(), before + 1);
        assert_eq!(t.last().unwrap().text, "**Updated Analysis.**\n\nv2");
    }

    #[tokio::test]
    async fn test_load_without_summary_appends_nothing() {
        let (mut c, _, history) = controller(FakeService::default().with_load(Ok(stats(9, None))));
        let outcome = c.load("o/r", false).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { appended: false }));
        assert!(c.session().transcript.is_empty());
        assert_eq!(history.find("o/r").unwrap().file_count, 9);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_state_untouched() {
        let (mut c, _, history) = controller(
            FakeService::default()
                .with_load(Ok(stats(3, Some("ok"))))
                .with_load(Err(ServiceError::api(500, "index exploded"))),
        );
        c.load("o/r", false).await;
        let transcript = c.session().transcript.clone();

        let outcome = c.load("o/r", true).await.unwrap();
        let LoadOutcome::Failed(e) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(e.to_string(), "index exploded");
        let s = c.session();
        assert_eq!(s.transcript, transcript);
        assert_eq!(s.phase, Phase::Ready);
        assert!(!s.is_loading_repo);
        assert_eq!(s.stats.as_ref().map(StatsView::files_count), Some(3));
        assert_eq!(history.read_all().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_initial_load_returns_to_idle_without_record() {
        let (mut c, _, history) =
            controller(FakeService::default().with_load(Err(ServiceError::api(404, "not found"))));
        let outcome = c.load("o/missing", false).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Failed(_)));
        assert_eq!(c.session().phase, Phase::Idle);
        assert!(history.read_all().is_empty());
    }

    #[tokio::test]
    async fn test_blank_url_is_noop() {
        let (mut c, _, _) = controller(FakeService::default());
        assert!(c.load("   ", false).await.is_none());
        assert!(c.activate("").is_none());
        assert!(!c.session().is_loading_repo);
        assert_eq!(c.session().phase, Phase::Idle);
    }

    #[test]
    fn test_activate_restores_speculative_state() {
        let (mut c, _, history) = controller(FakeService::default());
        history.record_load("o/r", 42, Utc::now()).unwrap();
        history
            .update_transcript("o/r", &[ChatMessage::user("q"), ChatMessage::bot("a")])
            .unwrap();

        let ticket = c.activate("o/r").unwrap();
        assert_eq!(ticket.url, "o/r");
        assert!(!ticket.force_refresh);
        let s = c.session();
        assert_eq!(s.url, "o/r");
        assert_eq!(s.transcript.len(), 2);
        assert_eq!(s.stats, Some(StatsView::Speculative { files_count: 42 }));
        assert_eq!(s.phase, Phase::LoadingInitial);
        assert!(s.is_loading_repo);
    }

    #[test]
    fn test_activate_unknown_repo_starts_empty() {
        let (mut c, _, _) = controller(FakeService::default());
        c.activate("new/repo").unwrap();
        assert!(c.session().transcript.is_empty());
        assert!(c.session().stats.is_none());
    }

    #[test]
    fn test_superseded_load_is_dropped() {
        let (mut c, _, _) = controller(FakeService::default());
        let background = c.activate("o/r").unwrap();
        let user = c.begin_load("o/r", false).unwrap();

        // Older response resolves first: dropped, newest still pending
        assert!(matches!(c.finish_load(background, Ok(stats(1, Some("old")))), LoadOutcome::Superseded));
        assert!(c.session().is_loading_repo);
        assert!(c.session().transcript.is_empty());

        assert!(matches!(c.finish_load(user, Ok(stats(2, Some("new")))), LoadOutcome::Loaded { .. }));
        assert_eq!(c.session().stats.as_ref().map(StatsView::files_count), Some(2));
        assert!(c.session().transcript[0].text.contains("new"));
        assert!(!c.session().is_loading_repo);
    }

    #[test]
    fn test_load_after_new_session_is_dropped() {
        let (mut c, _, history) = controller(FakeService::default());
        let ticket = c.begin_load("o/r", false).unwrap();
        c.new_session();
        assert!(matches!(c.finish_load(ticket, Ok(stats(1, Some("x")))), LoadOutcome::Superseded));
        assert!(c.session().url.is_empty());
        assert!(history.read_all().is_empty());
    }

    #[test]
    fn test_load_of_other_url_switches_session() {
        let (mut c, _, history) = controller(FakeService::default());
        history.record_load("b/two", 7, Utc::now()).unwrap();
        history.update_transcript("b/two", &[ChatMessage::bot("b")]).unwrap();
        c.activate("a/one").unwrap();
        c.pending_query_mut().push_str("draft");

        c.begin_load("b/two", false).unwrap();
        let s = c.session();
        assert_eq!(s.url, "b/two");
        assert_eq!(s.transcript, vec![ChatMessage::bot("b")]);
        assert!(s.pending_query.is_empty());
    }

    #[tokio::test]
    async fn test_send_composes_quote_and_clears_inputs() {
        let (mut c, service, history) = controller(
            FakeService::default()
                .with_load(Ok(stats(3, Some("ok"))))
                .with_answer(Ok("it parses args".to_string())),
        );
        c.load("o/r", false).await;
        c.pending_query_mut().push_str("what is this?");
        c.set_pending_quote(Some("fn main()".to_string()));

        assert!(c.send("gpt-4o").await);

        let s = c.session();
        assert!(s.pending_query.is_empty());
        assert!(s.pending_quote.is_none());
        assert!(!s.is_loading_answer);
        assert_eq!(s.transcript.len(), 3);
        let user = &s.transcript[1];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.text, "Context:\n> fn main()\n\nQuestion:\nwhat is this?");
        assert_eq!(s.transcript[2], ChatMessage::bot("it parses args"));

        let prompts = service.prompts.lock().unwrap();
        assert_eq!(prompts[0], (user.text.clone(), "gpt-4o".to_string()));
        assert_eq!(history.find("o/r").unwrap().transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_blank_send_is_noop() {
        let (mut c, service, _) = controller(FakeService::default());
        c.pending_query_mut().push_str("   \n");
        assert!(c.begin_send("m").is_none());
        assert!(!c.send("m").await);
        assert!(c.session().transcript.is_empty());
        assert!(!c.session().is_loading_answer);
        assert!(service.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_failure_becomes_bot_message() {
        let (mut c, _, _) = controller(
            FakeService::default().with_answer(Err(ServiceError::api(500, "model overloaded"))),
        );
        c.pending_query_mut().push_str("hello");
        assert!(c.send("m").await);
        let t = &c.session().transcript;
        assert_eq!(t.len(), 2);
        assert_eq!(t[1], ChatMessage::bot("**Error:** model overloaded"));
        assert!(!c.session().is_loading_answer);
    }

    #[tokio::test]
    async fn test_resend_appends_verbatim_then_answer() {
        let (mut c, service, _) = controller(FakeService::default().with_answer(Ok("again".to_string())));
        c.pending_query_mut().push_str("keep me");
        let original = ChatMessage::user("Context:\n> x\n\nQuestion:\ny");

        let ticket = c.begin_resend(&original, "m");
        assert_eq!(c.session().transcript.len(), 1);
        assert!(c.session().is_loading_answer);
        let result = ticket.execute(c.service().as_ref()).await;
        c.finish_chat(ticket, result);

        let t = &c.session().transcript;
        assert_eq!(t.len(), 2);
        assert_eq!(t[0], original);
        assert_eq!(t[1], ChatMessage::bot("again"));
        assert_eq!(c.session().pending_query, "keep me");
        assert_eq!(service.prompts.lock().unwrap()[0].0, original.text);
    }

    #[tokio::test]
    async fn test_resend_of_bot_message_preserves_role() {
        let (mut c, _, _) = controller(FakeService::default());
        let msg = ChatMessage::bot("earlier answer");
        c.resend(&msg, "m").await;
        let t = &c.session().transcript;
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].role, Role::Bot);
        assert!(t[1].text.starts_with("**Error:**"));
    }

    #[test]
    fn test_answer_after_new_session_is_dropped() {
        let (mut c, _, _) = controller(FakeService::default());
        c.pending_query_mut().push_str("q");
        let ticket = c.begin_send("m").unwrap();
        c.new_session();
        assert!(!c.finish_chat(ticket, Ok("late".to_string())));
        assert!(c.session().transcript.is_empty());
        assert!(!c.session().is_loading_answer);
    }

    #[tokio::test]
    async fn test_transcript_not_persisted_without_record() {
        let (mut c, _, history) = controller(FakeService::default().with_answer(Ok("a".to_string())));
        c.pending_query_mut().push_str("q");
        c.send("m").await;
        assert_eq!(c.session().transcript.len(), 2);
        assert!(history.read_all().is_empty());
    }

    #[tokio::test]
    async fn test_messages_sent_before_first_load_are_persisted_on_load() {
        let (mut c, _, history) = controller(FakeService::default().with_answer(Ok("early".to_string())));
        let ticket = c.activate("octocat/demo").unwrap();
        c.pending_query_mut().push_str("m");
        assert!(c.send("m").await);
        assert!(history.find("octocat/demo").is_none());

        assert!(matches!(
            c.finish_load(ticket, Ok(stats(3, Some("ok")))),
            LoadOutcome::Loaded { appended: false }
        ));
        let rec = history.find("octocat/demo").unwrap();
        assert_eq!(rec.file_count, 3);
        assert_eq!(rec.transcript.len(), 2);
        assert_eq!(rec.transcript, c.session().transcript);
    }

    #[test]
    fn test_new_session_resets_memory_only() {
        let (mut c, _, history) = controller(FakeService::default());
        history.record_load("o/r", 1, Utc::now()).unwrap();
        c.activate("o/r").unwrap();
        c.set_pending_quote(Some("q".to_string()));
        c.new_session();
        let s = c.session();
        assert!(s.url.is_empty());
        assert!(s.stats.is_none());
        assert!(s.pending_quote.is_none());
        assert_eq!(s.phase, Phase::Idle);
        assert!(!s.is_loading_repo);
        assert_eq!(history.read_all().len(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_octocat_demo() {
        let (mut c, _, history) = controller(FakeService::default().with_load(Ok(RepoStats {
            files_count: 3,
            chunks_count: ChunksCount::Count(12),
            summary: Some("ok".to_string()),
            file_paths: None,
        })));

        let background = c.activate("octocat/demo").unwrap();
        c.load("octocat/demo", false).await.unwrap();
        assert!(matches!(
            c.finish_load(background, Ok(stats(99, Some("stale")))),
            LoadOutcome::Superseded
        ));

        let rec = history.find("octocat/demo").unwrap();
        assert_eq!(rec.file_count, 3);
        assert_eq!(rec.transcript.len(), 1);
        assert_eq!(rec.transcript[0].role, Role::Bot);
        assert!(rec.transcript[0].text.contains("ok"));

        history.clear().unwrap();
        assert!(history.read_all().is_empty());
    }

    #[test]
    fn test_navigator_fires_once_per_distinct_value() {
        let mut nav = Navigator::default();
        assert_eq!(nav.navigate(Some("o/r")).as_deref(), Some("o/r"));
        assert_eq!(nav.navigate(Some("o/r")), None);
        assert_eq!(nav.navigate(Some(" o/r ")), None);
        assert_eq!(nav.navigate(None), None);
        assert_eq!(nav.navigate(Some("")), None);
        assert_eq!(nav.navigate(Some("o/other")).as_deref(), Some("o/other"));
        assert_eq!(nav.navigate(Some("o/r")).as_deref(), Some("o/r"));
        nav.reset();
        assert_eq!(nav.navigate(Some("o/r")).as_deref(), Some("o/r"));
    }
}
