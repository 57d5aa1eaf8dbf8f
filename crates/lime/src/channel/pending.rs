//! Pending-response registry for request/response correlation.
//!
//! Each in-flight `process_command` call registers a one-shot waiter keyed
//! by its command id. The channel's receiver worker resolves waiters as
//! responses arrive; a response without a matching waiter falls through to
//! the response queue. Registration is released on every exit path: a
//! guard removes the entry when the caller's future is dropped before the
//! response arrives.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use crate::protocol::Command;

use super::error::{ChannelError, ChannelResult};

/// Registry of one-shot waiters keyed by command id
#[derive(Debug, Default, Clone)]
pub(crate) struct PendingResponses {
    waiters: Arc<DashMap<String, oneshot::Sender<Command>>>,
}

/// Removes a registration when dropped, covering abandoned waits
#[derive(Debug)]
pub(crate) struct PendingGuard {
    waiters: Arc<DashMap<String, oneshot::Sender<Command>>>,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.waiters.remove(&self.id);
    }
}

impl PendingResponses {
    /// Register a waiter for the given command id.
    ///
    /// Fails with [`ChannelError::DuplicateCommandId`] when a waiter for
    /// the id is already registered.
    pub(crate) fn register(
        &self,
        id: &str,
    ) -> ChannelResult<(oneshot::Receiver<Command>, PendingGuard)> {
        let (sender, receiver) = oneshot::channel();
        let entry = self.waiters.entry(id.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ChannelError::DuplicateCommandId {
                id: id.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(sender);
                Ok((
                    receiver,
                    PendingGuard {
                        waiters: Arc::clone(&self.waiters),
                        id: id.to_string(),
                    },
                ))
            }
        }
    }

    /// Deliver a response to its waiter.
    ///
    /// Returns the response back when no waiter is registered for its id
    /// (or the waiter was abandoned), so the caller can route it to the
    /// response queue instead.
    pub(crate) fn resolve(&self, response: Command) -> Option<Command> {
        match self.waiters.remove(&response.header.id) {
            Some((_, sender)) => match sender.send(response) {
                Ok(()) => None,
                Err(response) => Some(response),
            },
            None => Some(response),
        }
    }

    /// Drop every waiter; pending `process_command` calls observe closure
    pub(crate) fn clear(&self) {
        self.waiters.clear();
    }

    /// Number of in-flight registrations
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, CommandMethod, LimeUri};

    fn request(id: &str) -> Command {
        Command::new_request(CommandMethod::Get, LimeUri::ping()).with_id(id)
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let pending = PendingResponses::default();
        let (receiver, _guard) = pending.register("a").unwrap();

        let response = request("a").success_response();
        assert!(pending.resolve(response.clone()).is_none());
        assert_eq!(receiver.await.unwrap(), response);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let pending = PendingResponses::default();
        let (_receiver, _guard) = pending.register("a").unwrap();
        assert!(matches!(
            pending.register("a").unwrap_err(),
            ChannelError::DuplicateCommandId { .. }
        ));
    }

    #[tokio::test]
    async fn test_unmatched_response_returned() {
        let pending = PendingResponses::default();
        let (_receiver, _guard) = pending.register("a").unwrap();

        let response = request("b").success_response();
        assert_eq!(pending.resolve(response.clone()), Some(response));
    }

    #[tokio::test]
    async fn test_guard_removes_registration_on_drop() {
        let pending = PendingResponses::default();
        {
            let (_receiver, _guard) = pending.register("a").unwrap();
            assert_eq!(pending.len(), 1);
        }
        assert_eq!(pending.len(), 0);
        // The id is free for a new registration
        let (_receiver, _guard) = pending.register("a").unwrap();
    }

    #[tokio::test]
    async fn test_clear_closes_waiters() {
        let pending = PendingResponses::default();
        let (receiver, _guard) = pending.register("a").unwrap();
        pending.clear();
        assert!(receiver.await.is_err());
    }
}
