use crate::api::RequestRunner;

use super::state::AppState;

/// Pairs a reducer-produced request with its submission to the worker.
/// Keeps the event loop free of job plumbing: every user intent funnels
/// through one of these methods.
pub struct ActionDispatcher<'a> {
    runner: &'a RequestRunner,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(runner: &'a RequestRunner) -> Self {
        Self { runner }
    }

    /// Returns true when a request was actually issued (the form passed
    /// local validation and nothing was already pending).
    pub fn submit_auth(&self, state: &mut AppState) -> bool {
        match state.begin_auth_submit() {
            Some(job) => {
                self.runner.submit(job);
                true
            }
            None => false,
        }
    }

    pub fn refresh(&self, state: &mut AppState) -> bool {
        match state.begin_refresh() {
            Some(job) => {
                self.runner.submit(job);
                true
            }
            None => false,
        }
    }

    pub fn save_draft(&self, state: &mut AppState) -> bool {
        match state.begin_save_edit() {
            Some(job) => {
                self.runner.submit(job);
                true
            }
            None => false,
        }
    }

    pub fn confirm_delete(&self, state: &mut AppState) -> bool {
        match state.confirm_delete() {
            Some(job) => {
                self.runner.submit(job);
                true
            }
            None => false,
        }
    }
}
