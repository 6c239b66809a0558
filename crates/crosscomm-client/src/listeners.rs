//! Listener registry and dispatch
//!
//! Subscriptions are kept in registration order and never removed. Each one
//! pairs a [`ListenerFilter`] with an async handler; an inbound envelope is
//! handed to every subscription whose filter matches.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crosscomm_core::{Envelope, MessageKind};

/// Async callback invoked with each matching envelope
pub type Handler = Arc<dyn Fn(Envelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// Box a closure returning a future into a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |envelope| Box::pin(f(envelope)))
}

// ----------------------------------------------------------------------------
// Dispatch Mode
// ----------------------------------------------------------------------------

/// How matching handlers are run for one inbound envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One after another in registration order; the receive loop waits
    #[default]
    Sequential,
    /// All spawned at once; the receive loop moves on immediately
    Concurrent,
}

// ----------------------------------------------------------------------------
// Listener Filter
// ----------------------------------------------------------------------------

/// Which envelopes a listener wants, and where transfers should land
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerFilter {
    kind: Option<MessageKind>,
    sender: Option<String>,
    download_dir: Option<PathBuf>,
}

impl ListenerFilter {
    /// Filter that matches every non-suppressed envelope
    pub fn any() -> Self {
        Self::default()
    }

    /// Only envelopes of `kind`
    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Only envelopes sent by `sender`
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Download file, image and folder payloads into `dir` before delivery
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn kind_filter(&self) -> Option<MessageKind> {
        self.kind
    }

    pub fn sender_filter(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn download_directory(&self) -> Option<&Path> {
        self.download_dir.as_deref()
    }

    /// True when both the kind and sender filters accept `envelope`
    pub fn matches(&self, envelope: &Envelope) -> bool {
        if envelope.kind().is_suppressed() {
            return false;
        }
        if let Some(kind) = self.kind {
            if envelope.kind() != kind {
                return false;
            }
        }
        match &self.sender {
            Some(sender) => envelope.from_client_id() == sender,
            None => true,
        }
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

struct Subscription {
    filter: ListenerFilter,
    handler: Handler,
}

/// Insertion-ordered set of subscriptions
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn add(&self, filter: ListenerFilter, handler: Handler) {
        self.subscriptions
            .write()
            .await
            .push(Arc::new(Subscription { filter, handler }));
    }

    pub(crate) async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Download directory of the first matching subscription that has one
    pub(crate) async fn download_dir_for(&self, envelope: &Envelope) -> Option<PathBuf> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|sub| sub.filter.matches(envelope))
            .find_map(|sub| sub.filter.download_dir.clone())
    }

    /// Hand `envelope` to every matching handler
    ///
    /// Matches are snapshotted before any handler runs, so handlers may
    /// register further listeners without deadlocking.
    pub(crate) async fn dispatch(&self, envelope: &Envelope, mode: DispatchMode) -> usize {
        let matched: Vec<Arc<Subscription>> = self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|sub| sub.filter.matches(envelope))
            .cloned()
            .collect();

        if matched.is_empty() {
            debug!(
                "No listener for {} envelope from {}",
                envelope.kind(),
                envelope.from_client_id()
            );
            return 0;
        }

        for sub in &matched {
            let task = tokio::spawn((sub.handler)(envelope.clone()));
            if mode == DispatchMode::Sequential {
                if let Err(e) = task.await {
                    error!(
                        "Listener for {} envelope {} failed: {}",
                        envelope.kind(),
                        envelope.id(),
                        e
                    );
                }
            }
        }
        matched.len()
    }
}
