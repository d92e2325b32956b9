use unicode_segmentation::UnicodeSegmentation;

use crate::api::{ApiError, ApiJob, LoginSession, RemoteNote, UserProfile};

pub const TITLE_MAX_CHARS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthView {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthField {
    Username,
    Password,
    ConfirmPassword,
}

/// Input buffers for the login/register card. Field contents live here so
/// the render layer stays stateless.
#[derive(Debug, Clone)]
pub struct AuthForm {
    pub view: AuthView,
    pub focus: AuthField,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

impl Default for AuthForm {
    fn default() -> Self {
        Self {
            view: AuthView::Login,
            focus: AuthField::Username,
            username: String::new(),
            password: String::new(),
            confirm_password: String::new(),
        }
    }
}

/// Credential state. `user` and `token` are set together on login success
/// and cleared together on logout; no other transition touches them.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub form: AuthForm,
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub pending: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// Monotonic tags for refresh requests. Only the response matching the
/// most recently issued tag may be applied; anything older is discarded so
/// a slow stale response can never clobber a newer collection.
#[derive(Debug, Clone, Default)]
pub struct RefreshSlot {
    issued: u64,
    applied: u64,
}

impl RefreshSlot {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn admit(&mut self, seq: u64) -> bool {
        if seq != self.issued {
            return false;
        }
        self.applied = seq;
        true
    }

    pub fn in_flight(&self) -> bool {
        self.issued > self.applied
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotesState {
    pub notes: Vec<RemoteNote>,
    pub query: String,
    pub search_active: bool,
    pub loading: bool,
    pub error: Option<String>,
    slot: RefreshSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Title,
    Content,
}

/// An unsaved note being created or edited. For an existing note this is a
/// copy; the collection entry is untouched until a save round-trips.
#[derive(Debug, Clone)]
pub struct DraftBuffer {
    pub note_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub focus: DraftField,
    cursor: usize,
    dirty: bool,
    saving: bool,
}

impl DraftBuffer {
    fn for_new() -> Self {
        Self {
            note_id: None,
            title: String::new(),
            content: String::new(),
            focus: DraftField::Title,
            cursor: 0,
            dirty: false,
            saving: false,
        }
    }

    fn from_note(note: &RemoteNote) -> Self {
        Self {
            note_id: Some(note.id),
            title: note.title.clone(),
            content: note.content.clone(),
            focus: DraftField::Content,
            cursor: note.content.len(),
            dirty: false,
            saving: false,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            DraftField::Title => DraftField::Content,
            DraftField::Content => DraftField::Title,
        };
    }

    pub fn insert_char(&mut self, ch: char) {
        match self.focus {
            DraftField::Title => {
                if self.title.graphemes(true).count() < TITLE_MAX_CHARS {
                    self.title.push(ch);
                    self.dirty = true;
                }
            }
            DraftField::Content => {
                let mut scratch = [0u8; 4];
                let encoded = ch.encode_utf8(&mut scratch);
                self.content.insert_str(self.cursor, encoded);
                self.cursor += encoded.len();
                self.dirty = true;
            }
        }
    }

    pub fn insert_newline(&mut self) {
        if self.focus == DraftField::Content {
            self.content.insert(self.cursor, '\n');
            self.cursor += 1;
            self.dirty = true;
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            DraftField::Title => {
                if self.title.pop().is_some() {
                    self.dirty = true;
                }
            }
            DraftField::Content => {
                if self.cursor == 0 {
                    return;
                }
                let prev = prev_grapheme_boundary(&self.content, self.cursor);
                self.content.drain(prev..self.cursor);
                self.cursor = prev;
                self.dirty = true;
            }
        }
    }

    pub fn delete(&mut self) {
        if self.focus != DraftField::Content || self.cursor >= self.content.len() {
            return;
        }
        let next = next_grapheme_boundary(&self.content, self.cursor);
        if next == self.cursor {
            return;
        }
        self.content.drain(self.cursor..next);
        self.dirty = true;
    }

    pub fn move_left(&mut self) {
        if self.focus == DraftField::Content && self.cursor > 0 {
            self.cursor = prev_grapheme_boundary(&self.content, self.cursor);
        }
    }

    pub fn move_right(&mut self) {
        if self.focus == DraftField::Content && self.cursor < self.content.len() {
            self.cursor = next_grapheme_boundary(&self.content, self.cursor);
        }
    }

    pub fn move_home(&mut self) {
        if self.focus == DraftField::Content {
            self.cursor = line_start(&self.content, self.cursor);
        }
    }

    pub fn move_end(&mut self) {
        if self.focus == DraftField::Content {
            self.cursor = line_end(&self.content, self.cursor);
        }
    }

    pub fn move_up(&mut self) {
        if self.focus != DraftField::Content {
            return;
        }
        let start = line_start(&self.content, self.cursor);
        if start == 0 {
            self.cursor = 0;
            return;
        }
        let column = column_at(&self.content, start, self.cursor);
        let prev_start = line_start(&self.content, start - 1);
        self.cursor = position_for_column(&self.content, prev_start, column);
    }

    pub fn move_down(&mut self) {
        if self.focus != DraftField::Content {
            return;
        }
        let end = line_end(&self.content, self.cursor);
        if end == self.content.len() {
            self.cursor = self.content.len();
            return;
        }
        let start = line_start(&self.content, self.cursor);
        let column = column_at(&self.content, start, self.cursor);
        self.cursor = position_for_column(&self.content, end + 1, column);
    }
}

/// The Viewing/Editing half of the model. Editing supersedes viewing: a
/// draft and a selection are never populated at the same time.
#[derive(Debug, Clone)]
pub enum Workspace {
    Viewing { selected: Option<i64> },
    Editing(DraftBuffer),
}

#[derive(Debug, Clone)]
pub struct DeleteNoteOverlay {
    pub note_id: i64,
    pub title: String,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    DeleteNote(DeleteNoteOverlay),
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub notes: NotesState,
    pub workspace: Workspace,
    pub preview_lines: usize,
    pub status_message: Option<String>,
    pub overlay: Option<OverlayState>,
}

impl AppState {
    pub fn new(preview_lines: usize) -> Self {
        Self {
            auth: AuthState::default(),
            notes: NotesState::default(),
            workspace: Workspace::Viewing { selected: None },
            preview_lines,
            status_message: None,
            overlay: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.token.is_some() && self.auth.user.is_some()
    }

    // ---- auth session -------------------------------------------------

    pub fn toggle_auth_view(&mut self) {
        self.auth.form.view = match self.auth.form.view {
            AuthView::Login => AuthView::Register,
            AuthView::Register => AuthView::Login,
        };
        self.auth.form.focus = AuthField::Username;
        self.auth.form.confirm_password.clear();
        self.auth.error = None;
        self.auth.notice = None;
    }

    pub fn focus_next_auth_field(&mut self) {
        let form = &mut self.auth.form;
        form.focus = match (form.focus, form.view) {
            (AuthField::Username, _) => AuthField::Password,
            (AuthField::Password, AuthView::Register) => AuthField::ConfirmPassword,
            (AuthField::Password, AuthView::Login) => AuthField::Username,
            (AuthField::ConfirmPassword, _) => AuthField::Username,
        };
    }

    pub fn push_auth_char(&mut self, ch: char) {
        if ch.is_control() {
            return;
        }
        let form = &mut self.auth.form;
        let field = match form.focus {
            AuthField::Username => &mut form.username,
            AuthField::Password => &mut form.password,
            AuthField::ConfirmPassword => &mut form.confirm_password,
        };
        if field.len() < 120 {
            field.push(ch);
        }
    }

    pub fn pop_auth_char(&mut self) {
        let form = &mut self.auth.form;
        let field = match form.focus {
            AuthField::Username => &mut form.username,
            AuthField::Password => &mut form.password,
            AuthField::ConfirmPassword => &mut form.confirm_password,
        };
        field.pop();
    }

    /// Validate the auth form and, when it passes, return the request to
    /// run. Local validation failures (missing fields, password mismatch)
    /// surface immediately and produce no job, so nothing hits the
    /// network. Re-entry while a submit is pending is ignored.
    pub fn begin_auth_submit(&mut self) -> Option<ApiJob> {
        if self.auth.pending {
            return None;
        }
        let username = self.auth.form.username.trim().to_string();
        let password = self.auth.form.password.clone();
        if username.is_empty() || password.is_empty() {
            self.auth.error = Some("Username and password are required".into());
            return None;
        }
        let job = match self.auth.form.view {
            AuthView::Register => {
                if password != self.auth.form.confirm_password {
                    self.auth.error = Some("Passwords do not match".into());
                    return None;
                }
                ApiJob::Register { username, password }
            }
            AuthView::Login => ApiJob::Login { username, password },
        };
        self.auth.pending = true;
        self.auth.error = None;
        self.auth.notice = None;
        Some(job)
    }

    pub fn apply_register(&mut self, result: Result<(), ApiError>) {
        self.auth.pending = false;
        match result {
            Ok(()) => {
                self.auth.form.view = AuthView::Login;
                self.auth.form.focus = AuthField::Username;
                self.auth.form.password.clear();
                self.auth.form.confirm_password.clear();
                self.auth.notice = Some("Registration successful. Please log in.".into());
            }
            Err(err) => {
                self.auth.error = Some(err.to_string());
            }
        }
    }

    /// Returns true when the session became authenticated, which is the
    /// caller's cue to issue the initial refresh.
    pub fn apply_login(&mut self, result: Result<LoginSession, ApiError>) -> bool {
        self.auth.pending = false;
        match result {
            Ok(session) => {
                // user and token always move together
                self.auth.user = Some(session.user);
                self.auth.token = Some(session.token);
                self.auth.error = None;
                self.auth.notice = None;
                self.auth.form.password.clear();
                self.auth.form.confirm_password.clear();
                true
            }
            Err(err) => {
                self.auth.error = Some(err.to_string());
                false
            }
        }
    }

    /// Drop the whole session: credentials, collection, selection, draft,
    /// and the note-level error all reset to the initial state.
    pub fn logout(&mut self) {
        self.auth = AuthState::default();
        self.notes = NotesState::default();
        self.workspace = Workspace::Viewing { selected: None };
        self.overlay = None;
        self.status_message = None;
    }

    // ---- notes collection ---------------------------------------------

    /// Issue a sequenced refresh for the current query. Returns `None`
    /// while unauthenticated; the collection is never fetched without a
    /// token.
    pub fn begin_refresh(&mut self) -> Option<ApiJob> {
        let token = self.auth.token.clone()?;
        let seq = self.notes.slot.issue();
        self.notes.loading = true;
        self.notes.error = None;
        Some(ApiJob::Refresh {
            seq,
            token,
            query: self.notes.query.clone(),
        })
    }

    pub fn apply_refresh(&mut self, seq: u64, result: Result<Vec<RemoteNote>, ApiError>) {
        if !self.notes.slot.admit(seq) {
            // A newer refresh was issued after this one; its response owns
            // the collection and the loading flag.
            tracing::debug!(seq, "discarding stale refresh response");
            return;
        }
        self.notes.loading = false;
        match result {
            Ok(notes) => {
                self.notes.notes = notes;
                self.sync_selection();
            }
            Err(err) => {
                // stale-but-available: keep whatever was displayed
                self.notes.error = Some(err.to_string());
            }
        }
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.notes.slot.in_flight()
    }

    pub fn apply_create(&mut self, result: Result<RemoteNote, ApiError>) {
        match result {
            Ok(note) => {
                let id = note.id;
                self.notes.notes.insert(0, note);
                self.notes.error = None;
                self.workspace = Workspace::Viewing { selected: Some(id) };
            }
            Err(err) => {
                self.notes.error = Some(err.to_string());
                if let Workspace::Editing(draft) = &mut self.workspace {
                    draft.saving = false;
                }
            }
        }
    }

    pub fn apply_update(&mut self, id: i64, result: Result<RemoteNote, ApiError>) {
        match result {
            Ok(note) => {
                if let Some(entry) = self.notes.notes.iter_mut().find(|entry| entry.id == id) {
                    *entry = note;
                }
                self.notes.error = None;
                self.workspace = Workspace::Viewing { selected: Some(id) };
                self.sync_selection();
            }
            Err(err) => {
                self.notes.error = Some(err.to_string());
                if let Workspace::Editing(draft) = &mut self.workspace {
                    draft.saving = false;
                }
            }
        }
    }

    pub fn apply_delete(&mut self, id: i64, result: Result<(), ApiError>) {
        match result {
            Ok(()) => {
                self.notes.notes.retain(|note| note.id != id);
                self.notes.error = None;
                match &mut self.workspace {
                    Workspace::Editing(draft) if draft.note_id == Some(id) => {
                        self.workspace = Workspace::Viewing { selected: None };
                    }
                    Workspace::Viewing { selected } if *selected == Some(id) => {
                        *selected = None;
                    }
                    _ => {}
                }
                self.sync_selection();
            }
            Err(err) => {
                self.notes.error = Some(err.to_string());
            }
        }
    }

    // ---- search --------------------------------------------------------

    pub fn begin_search(&mut self) {
        self.notes.search_active = true;
    }

    pub fn finish_search(&mut self) {
        self.notes.search_active = false;
    }

    /// Returns true when the query actually changed (the caller re-fetches).
    pub fn push_search_char(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        self.notes.query.push(ch);
        true
    }

    pub fn pop_search_char(&mut self) -> bool {
        self.notes.query.pop().is_some()
    }

    pub fn cancel_search(&mut self) -> bool {
        self.notes.search_active = false;
        if self.notes.query.is_empty() {
            return false;
        }
        self.notes.query.clear();
        true
    }

    // ---- edit/selection machine ----------------------------------------

    pub fn selected_note_id(&self) -> Option<i64> {
        match &self.workspace {
            Workspace::Viewing { selected } => *selected,
            Workspace::Editing(_) => None,
        }
    }

    pub fn selected_note(&self) -> Option<&RemoteNote> {
        let id = self.selected_note_id()?;
        self.notes.notes.iter().find(|note| note.id == id)
    }

    pub fn selected_index(&self) -> Option<usize> {
        let id = self.selected_note_id()?;
        self.notes.notes.iter().position(|note| note.id == id)
    }

    pub fn draft(&self) -> Option<&DraftBuffer> {
        match &self.workspace {
            Workspace::Editing(draft) => Some(draft),
            Workspace::Viewing { .. } => None,
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut DraftBuffer> {
        match &mut self.workspace {
            Workspace::Editing(draft) => Some(draft),
            Workspace::Viewing { .. } => None,
        }
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.workspace, Workspace::Editing(_))
    }

    pub fn new_note(&mut self) {
        self.workspace = Workspace::Editing(DraftBuffer::for_new());
    }

    /// Open a copy of an existing note for editing. Unknown ids are a
    /// no-op, matching `select_note`.
    pub fn edit_note(&mut self, id: i64) {
        if let Some(note) = self.notes.notes.iter().find(|note| note.id == id) {
            self.workspace = Workspace::Editing(DraftBuffer::from_note(note));
        }
    }

    pub fn select_note(&mut self, id: i64) {
        if self.notes.notes.iter().any(|note| note.id == id) {
            self.workspace = Workspace::Viewing { selected: Some(id) };
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.notes.notes.is_empty() || self.is_editing() {
            return;
        }
        let len = self.notes.notes.len() as isize;
        let current = self.selected_index().map(|idx| idx as isize).unwrap_or(0);
        let next = (current + delta).clamp(0, len - 1) as usize;
        let id = self.notes.notes[next].id;
        self.workspace = Workspace::Viewing { selected: Some(id) };
    }

    pub fn cancel_edit(&mut self) {
        if self.is_editing() {
            self.workspace = Workspace::Viewing { selected: None };
            self.sync_selection();
        }
    }

    /// Validate the draft and return the create/update request to run. The
    /// workspace stays in `Editing` until the outcome lands; a failed
    /// outcome keeps the draft (and its text) intact.
    pub fn begin_save_edit(&mut self) -> Option<ApiJob> {
        let token = match &self.auth.token {
            Some(token) => token.clone(),
            None => return None,
        };
        let title = {
            let Workspace::Editing(draft) = &self.workspace else {
                return None;
            };
            if draft.saving {
                return None;
            }
            draft.title.trim().to_string()
        };
        if title.is_empty() {
            self.notes.error = Some("Title cannot be empty".into());
            return None;
        }
        if title.graphemes(true).count() > TITLE_MAX_CHARS {
            self.notes.error = Some("Title is too long (128 characters max)".into());
            return None;
        }
        self.notes.error = None;
        let Workspace::Editing(draft) = &mut self.workspace else {
            return None;
        };
        draft.saving = true;
        let content = draft.content.clone();
        Some(match draft.note_id {
            Some(id) => ApiJob::Update {
                token,
                id,
                title,
                content,
            },
            None => ApiJob::Create {
                token,
                title,
                content,
            },
        })
    }

    // ---- overlays and status -------------------------------------------

    pub fn open_delete_overlay(&mut self) {
        let target_id = match &self.workspace {
            Workspace::Viewing { selected } => *selected,
            Workspace::Editing(draft) => draft.note_id,
        };
        let target = target_id.and_then(|id| {
            self.notes
                .notes
                .iter()
                .find(|note| note.id == id)
                .map(|note| (note.id, note.title.clone()))
        });
        if let Some((note_id, title)) = target {
            self.overlay = Some(OverlayState::DeleteNote(DeleteNoteOverlay { note_id, title }));
        }
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    /// Confirmation arrived (the overlay's Enter); return the delete
    /// request and dismiss the prompt.
    pub fn confirm_delete(&mut self) -> Option<ApiJob> {
        let token = self.auth.token.clone()?;
        let Some(OverlayState::DeleteNote(overlay)) = &self.overlay else {
            return None;
        };
        let id = overlay.note_id;
        self.overlay = None;
        Some(ApiJob::Delete { token, id })
    }

    pub fn delete_overlay(&self) -> Option<&DeleteNoteOverlay> {
        match &self.overlay {
            Some(OverlayState::DeleteNote(overlay)) => Some(overlay),
            None => None,
        }
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    /// Derived-state recomputation, run after every collection mutation:
    /// an empty collection forces Viewing(none); otherwise a missing or
    /// absent selection lands on the first note. Drafts pin the workspace.
    fn sync_selection(&mut self) {
        let notes = &self.notes.notes;
        if let Workspace::Viewing { selected } = &mut self.workspace {
            if notes.is_empty() {
                *selected = None;
            } else {
                let valid = selected
                    .map(|id| notes.iter().any(|note| note.id == id))
                    .unwrap_or(false);
                if !valid {
                    *selected = Some(notes[0].id);
                }
            }
        }
    }
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor == 0 {
        return 0;
    }
    let mut last = 0;
    for (idx, _) in text[..cursor].grapheme_indices(true) {
        last = idx;
    }
    last
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor >= text.len() {
        return text.len();
    }
    match text[cursor..].graphemes(true).next() {
        Some(grapheme) => cursor + grapheme.len(),
        None => text.len(),
    }
}

fn line_start(text: &str, cursor: usize) -> usize {
    text[..cursor].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

fn line_end(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .find('\n')
        .map(|idx| cursor + idx)
        .unwrap_or(text.len())
}

fn column_at(text: &str, line_start: usize, cursor: usize) -> usize {
    text[line_start..cursor].graphemes(true).count()
}

fn position_for_column(text: &str, line_start: usize, column: usize) -> usize {
    let line_end = line_end(text, line_start);
    let mut position = line_start;
    let mut count = 0;
    for grapheme in text[line_start..line_end].graphemes(true) {
        if count >= column {
            break;
        }
        position += grapheme.len();
        count += 1;
    }
    position
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn note(id: i64, title: &str, content: &str) -> RemoteNote {
        RemoteNote {
            id,
            title: title.to_string(),
            content: content.to_string(),
            updated_at: Some("2024-05-01T10:00:00Z".to_string()),
        }
    }

    fn session(username: &str) -> LoginSession {
        LoginSession {
            token: format!("token-{username}"),
            user: UserProfile {
                username: username.to_string(),
            },
        }
    }

    fn authenticated_state() -> AppState {
        let mut state = AppState::new(3);
        assert!(state.apply_login(Ok(session("ada"))));
        state
    }

    fn refresh_seq(job: ApiJob) -> u64 {
        match job {
            ApiJob::Refresh { seq, .. } => seq,
            other => panic!("expected refresh job, got {other:?}"),
        }
    }

    #[test]
    fn login_success_sets_user_and_token_together() {
        let mut state = AppState::new(3);
        assert!(!state.is_authenticated());

        let became_authenticated = state.apply_login(Ok(session("ada")));
        assert!(became_authenticated);
        assert!(state.auth.user.is_some());
        assert!(state.auth.token.is_some());
        assert!(state.auth.error.is_none());
    }

    #[test]
    fn login_failure_leaves_session_unauthenticated() {
        let mut state = AppState::new(3);
        let became_authenticated = state.apply_login(Err(ApiError::Rejected {
            status: 401,
            detail: "Invalid credentials".into(),
        }));
        assert!(!became_authenticated);
        assert!(state.auth.user.is_none());
        assert!(state.auth.token.is_none());
        assert_eq!(state.auth.error.as_deref(), Some("Invalid credentials"));
    }

    #[test]
    fn register_with_mismatched_passwords_issues_no_request() {
        let mut state = AppState::new(3);
        state.toggle_auth_view();
        state.auth.form.username = "bob".into();
        state.auth.form.password = "pw1".into();
        state.auth.form.confirm_password = "pw2".into();

        assert!(state.begin_auth_submit().is_none());
        assert_eq!(state.auth.error.as_deref(), Some("Passwords do not match"));
        assert!(!state.auth.pending);
    }

    #[test]
    fn register_success_switches_to_login_with_notice() {
        let mut state = AppState::new(3);
        state.toggle_auth_view();
        state.auth.form.username = "bob".into();
        state.auth.form.password = "pw".into();
        state.auth.form.confirm_password = "pw".into();

        let job = state.begin_auth_submit().expect("register job");
        assert_matches!(job, ApiJob::Register { .. });
        assert!(state.auth.pending);

        state.apply_register(Ok(()));
        assert_eq!(state.auth.form.view, AuthView::Login);
        assert!(state.auth.notice.is_some());
        assert!(state.auth.error.is_none());
        assert!(state.auth.form.password.is_empty());
    }

    #[test]
    fn submit_is_ignored_while_a_request_is_pending() {
        let mut state = AppState::new(3);
        state.auth.form.username = "ada".into();
        state.auth.form.password = "pw".into();

        assert!(state.begin_auth_submit().is_some());
        assert!(state.begin_auth_submit().is_none());
    }

    #[test]
    fn refresh_requires_a_token() {
        let mut state = AppState::new(3);
        assert!(state.begin_refresh().is_none());
        assert!(!state.notes.loading);
    }

    #[test]
    fn refresh_replaces_collection_and_clears_loading() {
        let mut state = authenticated_state();
        let seq = refresh_seq(state.begin_refresh().expect("refresh job"));
        assert!(state.notes.loading);

        state.apply_refresh(seq, Ok(vec![note(1, "First", "a"), note(2, "Second", "b")]));
        assert!(!state.notes.loading);
        assert_eq!(state.notes.notes.len(), 2);
    }

    #[test]
    fn refresh_failure_keeps_stale_collection() {
        let mut state = authenticated_state();
        let seq1 = refresh_seq(state.begin_refresh().expect("first refresh"));
        state.apply_refresh(seq1, Ok(vec![note(1, "Kept", "body")]));

        let seq2 = refresh_seq(state.begin_refresh().expect("second refresh"));
        state.apply_refresh(seq2, Err(ApiError::Transport("connection refused".into())));

        assert!(!state.notes.loading);
        assert_eq!(state.notes.notes.len(), 1, "previous collection survives");
        assert!(state.notes.error.is_some());
    }

    #[test]
    fn stale_refresh_response_is_discarded() {
        let mut state = authenticated_state();
        let seq_old = refresh_seq(state.begin_refresh().expect("old refresh"));
        state.notes.query = "mil".into();
        let seq_new = refresh_seq(state.begin_refresh().expect("new refresh"));

        // The newer response lands first.
        state.apply_refresh(seq_new, Ok(vec![note(7, "Milk run", "eggs")]));
        assert_eq!(state.notes.notes.len(), 1);
        assert!(!state.notes.loading);

        // The slow stale response must not clobber it.
        state.apply_refresh(seq_old, Ok(vec![note(1, "Old", ""), note(2, "Older", "")]));
        assert_eq!(state.notes.notes.len(), 1);
        assert_eq!(state.notes.notes[0].id, 7);
    }

    #[test]
    fn stale_discard_preserves_loading_while_newer_is_outstanding() {
        let mut state = authenticated_state();
        let seq_old = refresh_seq(state.begin_refresh().expect("old refresh"));
        let _seq_new = state.begin_refresh().expect("new refresh");

        state.apply_refresh(seq_old, Ok(vec![note(1, "Old", "")]));
        assert!(state.notes.loading, "newer request still owns the flag");
        assert!(state.refresh_in_flight());
        assert!(state.notes.notes.is_empty());
    }

    #[test]
    fn collection_arrival_auto_selects_first_note() {
        let mut state = authenticated_state();
        let seq = refresh_seq(state.begin_refresh().expect("refresh"));
        state.apply_refresh(seq, Ok(vec![note(1, "First", ""), note(2, "Second", "")]));
        assert_eq!(state.selected_note_id(), Some(1));
    }

    #[test]
    fn empty_collection_forces_no_selection() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(4, "Only", "")];
        state.select_note(4);

        let seq = refresh_seq(state.begin_refresh().expect("refresh"));
        state.apply_refresh(seq, Ok(Vec::new()));
        assert_eq!(state.selected_note_id(), None);
        assert_matches!(state.workspace, Workspace::Viewing { selected: None });
    }

    #[test]
    fn auto_select_skips_when_a_draft_is_open() {
        let mut state = authenticated_state();
        state.new_note();

        let seq = refresh_seq(state.begin_refresh().expect("refresh"));
        state.apply_refresh(seq, Ok(vec![note(1, "First", "")]));
        assert!(state.is_editing(), "draft pins the workspace");
    }

    #[test]
    fn create_prepends_and_selects_new_note() {
        let mut state = authenticated_state();
        state.new_note();
        {
            let draft = state.draft_mut().expect("draft");
            draft.title = "Groceries".into();
            draft.content = "Milk, eggs".into();
        }

        let job = state.begin_save_edit().expect("create job");
        assert_matches!(job, ApiJob::Create { .. });

        state.apply_create(Ok(note(9, "Groceries", "Milk, eggs")));
        assert_eq!(state.notes.notes.len(), 1);
        assert_eq!(state.notes.notes[0].title, "Groceries");
        assert_eq!(state.selected_note_id(), Some(9));
        assert!(!state.is_editing());
    }

    #[test]
    fn create_failure_keeps_draft_open() {
        let mut state = authenticated_state();
        state.new_note();
        {
            let draft = state.draft_mut().expect("draft");
            draft.title = "Groceries".into();
            draft.content = "Milk".into();
        }
        assert!(state.begin_save_edit().is_some());

        state.apply_create(Err(ApiError::Transport("connection reset".into())));
        let draft = state.draft().expect("draft survives");
        assert_eq!(draft.title, "Groceries");
        assert_eq!(draft.content, "Milk");
        assert!(!draft.is_saving(), "save can be retried");
        assert!(state.notes.error.is_some());
    }

    #[test]
    fn update_replaces_entry_in_place() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(1, "First", "a"), note(2, "Second", "b")];
        state.edit_note(2);
        state.draft_mut().expect("draft").title = "Second, revised".into();

        let job = state.begin_save_edit().expect("update job");
        assert_matches!(job, ApiJob::Update { id: 2, .. });

        state.apply_update(2, Ok(note(2, "Second, revised", "b")));
        assert_eq!(state.notes.notes[1].title, "Second, revised");
        assert_eq!(state.notes.notes[0].id, 1, "position preserved");
        assert_eq!(state.selected_note_id(), Some(2));
    }

    #[test]
    fn editing_an_existing_note_edits_a_copy() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(1, "Original", "body")];
        state.edit_note(1);
        state.draft_mut().expect("draft").insert_char('!');

        assert_eq!(state.notes.notes[0].content, "body", "stored note untouched");
    }

    #[test]
    fn empty_title_is_rejected_locally() {
        let mut state = authenticated_state();
        state.new_note();
        state.draft_mut().expect("draft").content = "body".into();

        assert!(state.begin_save_edit().is_none());
        assert!(state.is_editing());
        assert_eq!(state.notes.error.as_deref(), Some("Title cannot be empty"));
    }

    #[test]
    fn delete_clears_open_draft_for_that_note() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(5, "Doomed", "x")];
        state.edit_note(5);

        state.apply_delete(5, Ok(()));
        assert!(state.notes.notes.is_empty());
        assert_matches!(state.workspace, Workspace::Viewing { selected: None });
    }

    #[test]
    fn delete_of_selected_note_advances_to_first_remaining() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(1, "First", ""), note(2, "Second", "")];
        state.select_note(2);

        state.apply_delete(2, Ok(()));
        assert_eq!(state.notes.notes.len(), 1);
        assert_eq!(state.selected_note_id(), Some(1));
    }

    #[test]
    fn delete_failure_leaves_collection_unchanged() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(1, "Kept", "")];
        state.select_note(1);

        state.apply_delete(
            1,
            Err(ApiError::Rejected {
                status: 500,
                detail: "boom".into(),
            }),
        );
        assert_eq!(state.notes.notes.len(), 1);
        assert_eq!(state.selected_note_id(), Some(1));
        assert_eq!(state.notes.error.as_deref(), Some("boom"));
    }

    #[test]
    fn confirm_delete_consumes_the_overlay() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(3, "Target", "")];
        state.select_note(3);
        state.open_delete_overlay();
        assert!(state.delete_overlay().is_some());

        let job = state.confirm_delete().expect("delete job");
        assert_matches!(job, ApiJob::Delete { id: 3, .. });
        assert!(state.delete_overlay().is_none());
    }

    #[test]
    fn logout_clears_every_state_slot() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(1, "First", "")];
        state.notes.query = "milk".into();
        state.notes.error = Some("old error".into());
        state.edit_note(1);

        state.logout();
        assert!(state.auth.user.is_none());
        assert!(state.auth.token.is_none());
        assert!(state.notes.notes.is_empty());
        assert!(state.notes.query.is_empty());
        assert!(state.notes.error.is_none());
        assert_matches!(state.workspace, Workspace::Viewing { selected: None });
        assert!(state.begin_refresh().is_none(), "no fetch after logout");
    }

    #[test]
    fn select_note_ignores_unknown_ids() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(1, "First", "")];
        state.select_note(1);
        state.select_note(42);
        assert_eq!(state.selected_note_id(), Some(1));
    }

    #[test]
    fn cancel_edit_falls_back_to_default_selection() {
        let mut state = authenticated_state();
        state.notes.notes = vec![note(1, "First", ""), note(2, "Second", "")];
        state.edit_note(2);

        state.cancel_edit();
        assert!(!state.is_editing());
        assert_eq!(state.selected_note_id(), Some(1));
    }

    #[test]
    fn draft_cursor_moves_by_graphemes() {
        let mut state = authenticated_state();
        state.new_note();
        let draft = state.draft_mut().expect("draft");
        draft.toggle_focus();
        assert_eq!(draft.focus, DraftField::Content);
        draft.insert_char('a');
        draft.insert_char('é');
        draft.insert_newline();
        draft.insert_char('b');

        draft.move_up();
        draft.move_end();
        draft.backspace();
        assert_eq!(draft.content, "a\nb");
        assert!(draft.is_dirty());
    }

    #[test]
    fn title_input_is_capped() {
        let mut state = authenticated_state();
        state.new_note();
        let draft = state.draft_mut().expect("draft");
        for _ in 0..(TITLE_MAX_CHARS + 10) {
            draft.insert_char('x');
        }
        assert_eq!(draft.title.len(), TITLE_MAX_CHARS);
    }
}
