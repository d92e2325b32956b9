use std::env;
use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::api::{LoginSession, NotesGateway, RemoteNote};

const PASSWORD_ENV: &str = "NOTECLI_PASSWORD";

#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    /// Username to authenticate as (prompted if omitted)
    #[arg(long)]
    pub username: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Search query forwarded to the server (all notes if omitted)
    #[arg()]
    pub query: Vec<String>,
    /// Limit the number of results printed
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note (prompted if omitted)
    #[arg()]
    pub title: Option<String>,
    /// Provide the note content inline. If omitted, reads from stdin.
    #[arg(long)]
    pub content: Option<String>,
    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier
    pub note_id: i64,
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Username for the new account (prompted if omitted)
    #[arg()]
    pub username: Option<String>,
}

pub fn list_notes(gateway: &dyn NotesGateway, args: ListArgs) -> Result<()> {
    let session = authenticate(gateway, &args.credentials)?;
    let query = args.query.join(" ");
    let notes = gateway
        .list_notes(&session.token, query.trim())
        .context("fetching notes")?;
    print!("{}", format_note_list(&notes, args.limit));
    Ok(())
}

pub fn new_note(gateway: &dyn NotesGateway, args: NewArgs) -> Result<()> {
    let title = match args.title {
        Some(title) => title,
        None => prompt("Title")?,
    };
    let title = title.trim().to_owned();
    if title.is_empty() {
        bail!("note title cannot be empty");
    }
    let content = match args.content {
        Some(content) => content,
        None => read_stdin()?.unwrap_or_default(),
    };

    let session = authenticate(gateway, &args.credentials)?;
    let note = gateway
        .create_note(&session.token, &title, &content)
        .context("creating note")?;
    println!("Created note #{} ({})", note.id, note.title);
    Ok(())
}

/// Delete a note after the injected confirmation approves it. The prompt is
/// a parameter so tests (and `--yes`) bypass the interactive path.
pub fn delete_note<F>(gateway: &dyn NotesGateway, args: DeleteArgs, confirm: F) -> Result<()>
where
    F: FnOnce(&str) -> Result<bool>,
{
    let session = authenticate(gateway, &args.credentials)?;
    if !args.yes {
        let question = format!("Delete note #{}?", args.note_id);
        if !confirm(&question)? {
            println!("Canceled.");
            return Ok(());
        }
    }
    gateway
        .delete_note(&session.token, args.note_id)
        .with_context(|| format!("deleting note #{}", args.note_id))?;
    println!("Deleted note #{}", args.note_id);
    Ok(())
}

pub fn register(gateway: &dyn NotesGateway, args: RegisterArgs) -> Result<()> {
    let username = match args.username {
        Some(username) => username,
        None => prompt("Username")?,
    };
    let (password, confirm) = match env::var(PASSWORD_ENV) {
        Ok(password) => (password.clone(), password),
        Err(_) => (prompt("Password")?, prompt("Confirm password")?),
    };
    register_account(gateway, username.trim(), &password, &confirm)?;
    println!("Registered '{}'. You can now log in.", username.trim());
    Ok(())
}

/// Registration core with the same local validation as the TUI form: a
/// password mismatch never reaches the gateway.
fn register_account(
    gateway: &dyn NotesGateway,
    username: &str,
    password: &str,
    confirm: &str,
) -> Result<()> {
    if username.is_empty() || password.is_empty() {
        bail!("username and password cannot be empty");
    }
    if password != confirm {
        bail!("passwords do not match");
    }
    gateway
        .register(username, password)
        .with_context(|| format!("registering user '{username}'"))?;
    Ok(())
}

fn authenticate(gateway: &dyn NotesGateway, args: &CredentialArgs) -> Result<LoginSession> {
    let username = match &args.username {
        Some(username) => username.clone(),
        None => prompt("Username")?,
    };
    let password = match env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => prompt("Password")?,
    };
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        bail!("username and password cannot be empty");
    }
    gateway
        .login(username, &password)
        .with_context(|| format!("logging in as '{username}'"))
}

pub fn prompt_confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} [y/N]"))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn format_note_list(notes: &[RemoteNote], limit: usize) -> String {
    if notes.is_empty() {
        return "No notes found.\n".to_string();
    }
    let mut out = String::new();
    for note in notes.iter().take(limit) {
        let _ = writeln!(&mut out, "#{}  {}", note.id, note.title);
        if let Some(updated) = note.updated_at.as_deref() {
            let _ = writeln!(&mut out, "    updated {updated}");
        }
        if let Some(snippet) = build_snippet(&note.content, 2) {
            let _ = writeln!(&mut out, "    {snippet}");
        }
        out.push('\n');
    }
    if notes.len() > limit {
        let _ = writeln!(&mut out, "... and {} more", notes.len() - limit);
    }
    out
}

fn build_snippet(content: &str, max_lines: usize) -> Option<String> {
    let mut segments = Vec::new();
    for line in content.lines().take(max_lines) {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            segments.push(trimmed.to_string());
        }
    }
    if segments.is_empty() {
        None
    } else {
        let snippet = segments.join(" ");
        Some(snippet.chars().take(160).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::api::{ApiError, UserProfile};

    #[derive(Default)]
    struct FakeGateway {
        notes: Mutex<Vec<RemoteNote>>,
        register_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    impl FakeGateway {
        fn with_notes(notes: Vec<RemoteNote>) -> Self {
            Self {
                notes: Mutex::new(notes),
                ..Self::default()
            }
        }
    }

    impl NotesGateway for FakeGateway {
        fn register(&self, _username: &str, _password: &str) -> Result<(), ApiError> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn login(&self, username: &str, _password: &str) -> Result<LoginSession, ApiError> {
            Ok(LoginSession {
                token: "fake-token".into(),
                user: UserProfile {
                    username: username.to_string(),
                },
            })
        }

        fn list_notes(&self, _token: &str, search: &str) -> Result<Vec<RemoteNote>, ApiError> {
            let notes = self.notes.lock().expect("lock");
            Ok(notes
                .iter()
                .filter(|note| search.is_empty() || note.title.contains(search))
                .cloned()
                .collect())
        }

        fn create_note(
            &self,
            _token: &str,
            title: &str,
            content: &str,
        ) -> Result<RemoteNote, ApiError> {
            let mut notes = self.notes.lock().expect("lock");
            let note = RemoteNote {
                id: notes.len() as i64 + 1,
                title: title.to_string(),
                content: content.to_string(),
                updated_at: None,
            };
            notes.insert(0, note.clone());
            Ok(note)
        }

        fn update_note(
            &self,
            _token: &str,
            _id: i64,
            _title: &str,
            _content: &str,
        ) -> Result<RemoteNote, ApiError> {
            Err(ApiError::Transport("unused in cli tests".into()))
        }

        fn delete_note(&self, _token: &str, id: i64) -> Result<(), ApiError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            let mut notes = self.notes.lock().expect("lock");
            notes.retain(|note| note.id != id);
            Ok(())
        }
    }

    fn sample(id: i64, title: &str, content: &str) -> RemoteNote {
        RemoteNote {
            id,
            title: title.to_string(),
            content: content.to_string(),
            updated_at: Some("2024-05-01T10:00:00Z".to_string()),
        }
    }

    fn credentials() -> CredentialArgs {
        CredentialArgs {
            username: Some("ada".into()),
        }
    }

    #[test]
    fn register_rejects_mismatched_passwords_without_a_request() {
        let gateway = FakeGateway::default();
        let result = register_account(&gateway, "bob", "pw1", "pw2");
        assert!(result.is_err());
        assert_eq!(gateway.register_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_forwards_matching_passwords() -> Result<()> {
        let gateway = FakeGateway::default();
        register_account(&gateway, "bob", "pw", "pw")?;
        assert_eq!(gateway.register_calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn declined_confirmation_skips_the_delete_request() -> Result<()> {
        env::set_var(PASSWORD_ENV, "pw");
        let gateway = FakeGateway::with_notes(vec![sample(1, "Keep me", "body")]);
        delete_note(
            &gateway,
            DeleteArgs {
                note_id: 1,
                yes: false,
                credentials: credentials(),
            },
            |_| Ok(false),
        )?;
        assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.notes.lock().expect("lock").len(), 1);
        Ok(())
    }

    #[test]
    fn yes_flag_bypasses_the_confirmation_prompt() -> Result<()> {
        env::set_var(PASSWORD_ENV, "pw");
        let gateway = FakeGateway::with_notes(vec![sample(1, "Doomed", "body")]);
        delete_note(
            &gateway,
            DeleteArgs {
                note_id: 1,
                yes: true,
                credentials: credentials(),
            },
            |_| panic!("confirmation must not run with --yes"),
        )?;
        assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 1);
        assert!(gateway.notes.lock().expect("lock").is_empty());
        Ok(())
    }

    #[test]
    fn note_list_formats_titles_and_snippets() {
        let notes = vec![
            sample(1, "Project Plan", "Timeline overview\nmore detail"),
            sample(2, "Misc", ""),
        ];
        let output = format_note_list(&notes, 10);
        assert!(output.contains("#1  Project Plan"));
        assert!(output.contains("Timeline overview more detail"));
        assert!(output.contains("#2  Misc"));
    }

    #[test]
    fn note_list_reports_truncation() {
        let notes = vec![sample(1, "One", ""), sample(2, "Two", "")];
        let output = format_note_list(&notes, 1);
        assert!(output.contains("... and 1 more"));
    }

    #[test]
    fn empty_note_list_prints_a_hint() {
        assert_eq!(format_note_list(&[], 10), "No notes found.\n");
    }

    #[test]
    fn snippet_skips_blank_lines_and_caps_length() {
        assert_eq!(build_snippet("\n\n  \n", 3), None);
        let long = "x".repeat(400);
        let snippet = build_snippet(&long, 1).expect("snippet");
        assert_eq!(snippet.chars().count(), 160);
    }
}
