use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use super::{ApiError, LoginSession, NotesGateway, RemoteNote};

/// A request the event loop wants executed. Jobs are plain data so the
/// state model can construct them without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiJob {
    Register {
        username: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Refresh {
        seq: u64,
        token: String,
        query: String,
    },
    Create {
        token: String,
        title: String,
        content: String,
    },
    Update {
        token: String,
        id: i64,
        title: String,
        content: String,
    },
    Delete {
        token: String,
        id: i64,
    },
}

/// The completed counterpart of an [`ApiJob`], applied to the state model
/// on the event-loop thread.
#[derive(Debug, Clone)]
pub enum ApiOutcome {
    Register(Result<(), ApiError>),
    Login(Result<LoginSession, ApiError>),
    Refresh {
        seq: u64,
        result: Result<Vec<RemoteNote>, ApiError>,
    },
    Created(Result<RemoteNote, ApiError>),
    Updated {
        id: i64,
        result: Result<RemoteNote, ApiError>,
    },
    Deleted {
        id: i64,
        result: Result<(), ApiError>,
    },
}

/// Runs gateway calls on a single worker thread. Jobs queue in submission
/// order; outcomes are polled non-blocking once per event-loop tick, so the
/// model is only ever mutated on the caller's thread.
pub struct RequestRunner {
    jobs: Sender<ApiJob>,
    outcomes: Receiver<ApiOutcome>,
}

impl RequestRunner {
    pub fn spawn(gateway: Arc<dyn NotesGateway>) -> Self {
        let (jobs, job_rx) = unbounded::<ApiJob>();
        let (outcome_tx, outcomes) = unbounded::<ApiOutcome>();
        thread::spawn(move || {
            for job in job_rx.iter() {
                let outcome = run_job(gateway.as_ref(), job);
                if outcome_tx.send(outcome).is_err() {
                    break;
                }
            }
        });
        Self { jobs, outcomes }
    }

    pub fn submit(&self, job: ApiJob) {
        if self.jobs.send(job).is_err() {
            tracing::warn!("request worker is gone; dropping job");
        }
    }

    /// Fetch one completed outcome if any is ready. Never blocks.
    pub fn poll(&self) -> Option<ApiOutcome> {
        match self.outcomes.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::warn!("request worker disconnected");
                None
            }
        }
    }
}

fn run_job(gateway: &dyn NotesGateway, job: ApiJob) -> ApiOutcome {
    match job {
        ApiJob::Register { username, password } => {
            ApiOutcome::Register(gateway.register(&username, &password))
        }
        ApiJob::Login { username, password } => {
            ApiOutcome::Login(gateway.login(&username, &password))
        }
        ApiJob::Refresh { seq, token, query } => {
            tracing::debug!(seq, %query, "refreshing notes");
            ApiOutcome::Refresh {
                seq,
                result: gateway.list_notes(&token, &query),
            }
        }
        ApiJob::Create {
            token,
            title,
            content,
        } => ApiOutcome::Created(gateway.create_note(&token, &title, &content)),
        ApiJob::Update {
            token,
            id,
            title,
            content,
        } => ApiOutcome::Updated {
            id,
            result: gateway.update_note(&token, id, &title, &content),
        },
        ApiJob::Delete { token, id } => ApiOutcome::Deleted {
            id,
            result: gateway.delete_note(&token, id),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::api::UserProfile;

    struct StaticGateway;

    impl NotesGateway for StaticGateway {
        fn register(&self, _username: &str, _password: &str) -> Result<(), ApiError> {
            Ok(())
        }

        fn login(&self, username: &str, _password: &str) -> Result<LoginSession, ApiError> {
            Ok(LoginSession {
                token: "tok-1".into(),
                user: UserProfile {
                    username: username.to_string(),
                },
            })
        }

        fn list_notes(&self, _token: &str, _search: &str) -> Result<Vec<RemoteNote>, ApiError> {
            Ok(Vec::new())
        }

        fn create_note(
            &self,
            _token: &str,
            _title: &str,
            _content: &str,
        ) -> Result<RemoteNote, ApiError> {
            Err(ApiError::Transport("unused".into()))
        }

        fn update_note(
            &self,
            _token: &str,
            _id: i64,
            _title: &str,
            _content: &str,
        ) -> Result<RemoteNote, ApiError> {
            Err(ApiError::Transport("unused".into()))
        }

        fn delete_note(&self, _token: &str, _id: i64) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn poll_until(runner: &RequestRunner) -> ApiOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = runner.poll() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "worker never responded");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runner_executes_jobs_in_submission_order() {
        let runner = RequestRunner::spawn(Arc::new(StaticGateway));
        runner.submit(ApiJob::Login {
            username: "ada".into(),
            password: "pw".into(),
        });
        runner.submit(ApiJob::Refresh {
            seq: 1,
            token: "tok-1".into(),
            query: String::new(),
        });

        match poll_until(&runner) {
            ApiOutcome::Login(Ok(session)) => assert_eq!(session.user.username, "ada"),
            other => panic!("expected login outcome first, got {other:?}"),
        }
        match poll_until(&runner) {
            ApiOutcome::Refresh { seq, result } => {
                assert_eq!(seq, 1);
                assert!(result.is_ok());
            }
            other => panic!("expected refresh outcome, got {other:?}"),
        }
    }

    #[test]
    fn poll_returns_none_when_idle() {
        let runner = RequestRunner::spawn(Arc::new(StaticGateway));
        assert!(runner.poll().is_none());
    }
}
