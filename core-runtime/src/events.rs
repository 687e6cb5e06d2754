//! # Event Bus System
//!
//! Typed notifications for the transfer engine over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: [`TransferEvent`] for job lifecycle, [`SchedulerEvent`] for
//!   housekeeping performed by the scheduler
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Orchestrator ├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//! ┌──────────────┐     emit      │           │                  └────────────┘
//! │  Scheduler   ├──────────────>│           │
//! └──────────────┘               └───────────┘
//! ```
//!
//! Publishing never blocks a worker. With no subscriber attached `emit`
//! returns an error, which publishers ignore.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, TransferEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Transfer(TransferEvent::Completed { .. })));
//!
//! bus.emit(CoreEvent::Transfer(TransferEvent::Completed {
//!     job_id: "job-1".to_string(),
//!     transferred: 12,
//!     total: 14,
//!     unmatched: 2,
//!     playlist_id: "pl-9".to_string(),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.severity(), core_runtime::events::EventSeverity::Info);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and may continue.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Transfer(TransferEvent),
    Scheduler(SchedulerEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Transfer(e) => e.description(),
            CoreEvent::Scheduler(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Transfer(TransferEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::Requeued { .. }) => EventSeverity::Warning,
            CoreEvent::Scheduler(SchedulerEvent::StaleJobsRequeued { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Transfer(TransferEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Transfer(TransferEvent::Queued { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Job the event refers to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Transfer(e) => Some(e.job_id()),
            CoreEvent::Scheduler(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Transfer Events
// ============================================================================

/// Lifecycle of a single transfer job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransferEvent {
    /// Job accepted and persisted
    Queued {
        job_id: String,
        user_id: String,
        source_provider: String,
        target_provider: String,
    },
    /// A worker acquired the lease
    Started { job_id: String, attempt: u32 },
    /// Phase change or batch written
    Progress {
        job_id: String,
        phase: String,
        transferred: u64,
        total: Option<u64>,
    },
    Completed {
        job_id: String,
        transferred: u64,
        total: u64,
        unmatched: u64,
        playlist_id: String,
    },
    /// Terminal failure
    Failed {
        job_id: String,
        message: String,
        attempts: u32,
    },
    /// Attempt failed but the job will run again
    Requeued {
        job_id: String,
        message: String,
        attempts: u32,
        run_at: i64,
    },
}

impl TransferEvent {
    fn description(&self) -> &str {
        match self {
            TransferEvent::Queued { .. } => "Transfer queued",
            TransferEvent::Started { .. } => "Transfer started",
            TransferEvent::Progress { .. } => "Transfer in progress",
            TransferEvent::Completed { .. } => "Transfer completed successfully",
            TransferEvent::Failed { .. } => "Transfer failed",
            TransferEvent::Requeued { .. } => "Transfer scheduled for retry",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            TransferEvent::Queued { job_id, .. }
            | TransferEvent::Started { job_id, .. }
            | TransferEvent::Progress { job_id, .. }
            | TransferEvent::Completed { job_id, .. }
            | TransferEvent::Failed { job_id, .. }
            | TransferEvent::Requeued { job_id, .. } => job_id,
        }
    }
}

// ============================================================================
// Scheduler Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SchedulerEvent {
    Started { concurrency: u32 },
    Stopped,
    StaleJobsRequeued { count: u64 },
    JobsPruned { count: u64 },
}

impl SchedulerEvent {
    fn description(&self) -> &str {
        match self {
            SchedulerEvent::Started { .. } => "Scheduler started",
            SchedulerEvent::Stopped => "Scheduler stopped",
            SchedulerEvent::StaleJobsRequeued { .. } => "Stale jobs requeued",
            SchedulerEvent::JobsPruned { .. } => "Old jobs pruned",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by publishers and subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only events about the given job.
    pub fn for_job(self, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        self.filter(move |event| event.job_id() == Some(job_id.as_str()))
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(job_id: &str, transferred: u64) -> CoreEvent {
        CoreEvent::Transfer(TransferEvent::Progress {
            job_id: job_id.to_string(),
            phase: "adding-tracks".to_string(),
            transferred,
            total: Some(207),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::default();
        assert!(bus.emit(CoreEvent::Scheduler(SchedulerEvent::Stopped)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Transfer(TransferEvent::Queued {
            job_id: "job-1".to_string(),
            user_id: "user-1".to_string(),
            source_provider: "spotify".to_string(),
            target_provider: "apple_music".to_string(),
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_for_job() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).for_job("job-2");

        bus.emit(progress("job-1", 100)).ok();
        bus.emit(CoreEvent::Scheduler(SchedulerEvent::JobsPruned { count: 3 }))
            .ok();
        bus.emit(progress("job-2", 200)).ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(received, progress("job-2", 200));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(progress("job-1", i)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Transfer(TransferEvent::Failed {
            job_id: "job-1".to_string(),
            message: "spotify authorization failed".to_string(),
            attempts: 1,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Transfer failed");

        let stale = CoreEvent::Scheduler(SchedulerEvent::StaleJobsRequeued { count: 1 });
        assert_eq!(stale.severity(), EventSeverity::Warning);
        assert_eq!(stale.job_id(), None);

        assert_eq!(progress("job-1", 1).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Transfer(TransferEvent::Requeued {
            job_id: "job-123".to_string(),
            message: "upstream 503".to_string(),
            attempts: 2,
            run_at: 1_700_000_000_000,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"Transfer""#));
        assert!(json.contains(r#""event":"Requeued""#));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
