//! Explicitly owned connection slot: one live session per credential, released on logout.

use tracing::debug;

pub struct SessionSlot<S> {
    current: Option<(String, S)>,
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<S> SessionSlot<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the session for `token`, opening it on first use. A different token
    /// drops the previous session before opening a new one.
    pub fn acquire<F, E>(&mut self, token: &str, open: F) -> Result<&S, E>
    where
        F: FnOnce(&str) -> Result<S, E>,
    {
        if matches!(&self.current, Some((held, _)) if held != token) {
            debug!("credential changed, replacing session");
            self.current = None;
        }
        let entry = match self.current.take() {
            Some(entry) => entry,
            None => (token.to_string(), open(token)?),
        };
        Ok(&self.current.insert(entry).1)
    }

    pub fn current(&self) -> Option<&S> {
        self.current.as_ref().map(|(_, session)| session)
    }

    /// Drop the session on logout, returning it to the caller for shutdown.
    pub fn release(&mut self) -> Option<S> {
        self.current.take().map(|(_, session)| session)
    }
}
