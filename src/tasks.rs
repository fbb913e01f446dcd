//! Background execution of slow operations.
//!
//! Key generation and hashing large files block, so a [`TaskRunner`] moves
//! them onto tokio's blocking pool and reports each completion as a
//! [`TaskEvent`] on a channel. Callers never observe partial results: an event
//! is sent only once the operation has finished or failed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::service::{PkiService, SignedDocument};
use crate::types::artifacts::IssuedPaths;
use crate::verification::VerificationResult;

/// Identifies one submitted task in its completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug)]
pub enum TaskEvent {
    Registered {
        id: TaskId,
        principal: String,
        result: Result<IssuedPaths, Error>,
    },
    Signed {
        id: TaskId,
        document: PathBuf,
        result: Result<SignedDocument, Error>,
    },
    Verified {
        id: TaskId,
        document: PathBuf,
        result: Result<VerificationResult, Error>,
    },
}

impl TaskEvent {
    pub fn id(&self) -> TaskId {
        match self {
            TaskEvent::Registered { id, .. }
            | TaskEvent::Signed { id, .. }
            | TaskEvent::Verified { id, .. } => *id,
        }
    }

    /// The error the task ended with, if any.
    pub fn error(&self) -> Option<&Error> {
        match self {
            TaskEvent::Registered { result, .. } => result.as_ref().err(),
            TaskEvent::Signed { result, .. } => result.as_ref().err(),
            TaskEvent::Verified { result, .. } => result.as_ref().err(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error().is_none()
    }
}

pub struct TaskRunner {
    service: Arc<PkiService>,
    handle: Handle,
    events: mpsc::UnboundedSender<TaskEvent>,
    next_id: AtomicU64,
}

impl TaskRunner {
    /// Create a runner that spawns onto `handle`. Completion events arrive on
    /// the returned receiver.
    pub fn new(
        service: Arc<PkiService>,
        handle: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let runner = Self {
            service,
            handle,
            events,
            next_id: AtomicU64::new(1),
        };
        (runner, rx)
    }

    pub fn service(&self) -> &Arc<PkiService> {
        &self.service
    }

    pub fn register(&self, principal: impl Into<String>) -> TaskId {
        let principal = principal.into();
        self.submit(move |service, id| {
            let result = service.register(&principal);
            TaskEvent::Registered {
                id,
                principal,
                result,
            }
        })
    }

    /// Sign under whatever session is active when the task runs.
    pub fn sign_file(&self, document: impl Into<PathBuf>) -> TaskId {
        let document = document.into();
        self.submit(move |service, id| {
            let result = service.sign_file(&document);
            TaskEvent::Signed {
                id,
                document,
                result,
            }
        })
    }

    pub fn verify_files(
        &self,
        document: impl Into<PathBuf>,
        signature: impl Into<PathBuf>,
        certificate: impl Into<PathBuf>,
    ) -> TaskId {
        let document = document.into();
        let signature = signature.into();
        let certificate = certificate.into();
        self.submit(move |service, id| {
            let result = service.verify_files(&document, &signature, &certificate);
            TaskEvent::Verified {
                id,
                document,
                result,
            }
        })
    }

    fn submit<F>(&self, work: F) -> TaskId
    where
        F: FnOnce(&PkiService, TaskId) -> TaskEvent + Send + 'static,
    {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let service = Arc::clone(&self.service);
        let events = self.events.clone();

        tracing::debug!(%id, "task submitted");
        self.handle.spawn_blocking(move || {
            let event = work(&service, id);
            if let Some(e) = event.error() {
                tracing::warn!(%id, error = %e, "task failed");
            } else {
                tracing::debug!(%id, "task finished");
            }
            if events.send(event).is_err() {
                tracing::debug!(%id, "task event dropped, receiver closed");
            }
        });
        id
    }
}
