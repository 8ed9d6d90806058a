//! Best-effort mirroring of committed Events to an external sink.
//!
//! A [`Publisher`] hands each Event to a dedicated worker thread that owns a
//! small tokio runtime, and waits for the sink call with a bounded timeout.
//! Failures and timeouts are logged and reported as a [`PublishOutcome`];
//! they never reach the caller's error path.

use crate::model::Event;
use eyre::{Context, Result};
use log::{debug, warn};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Extra time the caller allows the worker beyond the sink timeout.
const REPLY_GRACE: Duration = Duration::from_secs(1);

/// Destination for published Events.
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, key: &str, event: &Event) -> Result<()>;
}

/// Result of one bounded publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    Failed(String),
    TimedOut,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Job {
    event: Event,
    reply: SyncSender<PublishOutcome>,
}

/// Sends Events to a sink with a bounded wait.
///
/// Safe to use from synchronous code and from inside a tokio runtime: the
/// caller only blocks on a reply channel, never on a runtime.
pub struct Publisher {
    topic: String,
    timeout: Duration,
    jobs: Option<UnboundedSender<Job>>,
    staged: Mutex<Vec<Event>>,
}

impl Publisher {
    pub fn new(sink: Arc<dyn EventSink>, topic: impl Into<String>, timeout: Duration) -> Result<Self> {
        let topic = topic.into();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("Failed to build publisher runtime")?;
        let (jobs, queue) = tokio::sync::mpsc::unbounded_channel();

        let worker_topic = topic.clone();
        std::thread::Builder::new()
            .name("rmap-publish".to_string())
            .spawn(move || run_worker(runtime, queue, sink, worker_topic, timeout))
            .context("Failed to start publisher thread")?;

        Ok(Self {
            topic,
            timeout,
            jobs: Some(jobs),
            staged: Mutex::new(Vec::new()),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one Event now, waiting at most the configured timeout.
    pub fn publish(&self, event: &Event) -> PublishOutcome {
        let (reply, outcome) = mpsc::sync_channel(1);
        let job = Job {
            event: event.clone(),
            reply,
        };
        let outcome = match self.jobs.as_ref().map(|jobs| jobs.send(job)) {
            Some(Ok(())) => outcome
                .recv_timeout(self.timeout + REPLY_GRACE)
                .unwrap_or(PublishOutcome::TimedOut),
            _ => PublishOutcome::Failed("publisher is shut down".to_string()),
        };

        match &outcome {
            PublishOutcome::Delivered => debug!("Published event {} to {}", event.id, self.topic),
            PublishOutcome::Failed(e) => warn!("Failed to publish event {} to {}: {}", event.id, self.topic, e),
            PublishOutcome::TimedOut => warn!(
                "Timed out after {:?} publishing event {} to {}",
                self.timeout, event.id, self.topic
            ),
        }
        outcome
    }

    /// Hold an Event until the surrounding transaction commits.
    pub(crate) fn stage(&self, event: Event) {
        lock(&self.staged).push(event);
    }

    /// Publish everything staged, in staging order.
    pub(crate) fn flush(&self) -> Vec<PublishOutcome> {
        let staged: Vec<Event> = std::mem::take(&mut *lock(&self.staged));
        staged.iter().map(|e| self.publish(e)).collect()
    }

    /// Forget staged Events after a rollback.
    pub(crate) fn discard(&self) {
        let dropped = std::mem::take(&mut *lock(&self.staged));
        if !dropped.is_empty() {
            debug!("Discarded {} unpublished event(s) after rollback", dropped.len());
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        // Closing the queue stops the worker once it drains.
        self.jobs.take();
    }
}

fn run_worker(
    runtime: Runtime,
    mut queue: UnboundedReceiver<Job>,
    sink: Arc<dyn EventSink>,
    topic: String,
    timeout: Duration,
) {
    runtime.block_on(async {
        while let Some(Job { event, reply }) = queue.recv().await {
            let sink = Arc::clone(&sink);
            let topic = topic.clone();
            let key = event.id.to_string();
            let task = tokio::task::spawn_blocking(move || sink.publish(&topic, &key, &event));
            let outcome = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(Ok(()))) => PublishOutcome::Delivered,
                Ok(Ok(Err(e))) => PublishOutcome::Failed(e.to_string()),
                Ok(Err(join)) => PublishOutcome::Failed(join.to_string()),
                Err(_) => PublishOutcome::TimedOut,
            };
            // The caller may have given up waiting.
            let _ = reply.send(outcome);
        }
    });
    // A timed-out sink call may still be running; do not wait for it.
    runtime.shutdown_background();
}

#[derive(Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    key: &'a str,
    event: &'a Event,
}

/// Appends one JSON document per Event to a file.
pub struct JsonlEventSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlEventSink {
    fn publish(&self, topic: &str, key: &str, event: &Event) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {} for append", self.path.display()))?;

        let json = serde_json::to_string(&Envelope { topic, key, event }).context("Failed to serialize event")?;
        writeln!(file, "{}", json).context("Failed to write event")?;
        file.sync_all().context("Failed to sync event log")?;
        Ok(())
    }
}

/// Collects published Events in memory.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<(String, String, Event)>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published `(topic, key, event)` triples in publication order.
    pub fn events(&self) -> Vec<(String, String, Event)> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn publish(&self, topic: &str, key: &str, event: &Event) -> Result<()> {
        lock(&self.events).push((topic.to_string(), key.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventDetail;
    use crate::types::{Iri, TargetType};
    use chrono::Utc;
    use std::io::BufRead;
    use tempfile::TempDir;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn publish(&self, _topic: &str, _key: &str, _event: &Event) -> Result<()> {
            eyre::bail!("broker unavailable")
        }
    }

    struct SlowSink(Duration);

    impl EventSink for SlowSink {
        fn publish(&self, _topic: &str, _key: &str, _event: &Event) -> Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    fn make_event(id: &str) -> Event {
        let now = Utc::now();
        Event {
            id: Iri::new(id),
            target_type: TargetType::Disco,
            associated_agent: Iri::new("rmap:ag1"),
            associated_key: None,
            description: None,
            start_time: now,
            end_time: now,
            lineage_progenitor: Some(Iri::new("rmap:d1")),
            detail: EventDetail::Creation {
                created: vec![Iri::new("rmap:d1")],
            },
        }
    }

    #[test]
    fn test_publish_delivers_to_sink() {
        let sink = Arc::new(MemoryEventSink::new());
        let publisher = Publisher::new(sink.clone(), "topic", Duration::from_secs(5)).unwrap();
        assert_eq!(publisher.publish(&make_event("rmap:ev1")), PublishOutcome::Delivered);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "topic");
        assert_eq!(events[0].1, "rmap:ev1");
    }

    #[tokio::test]
    async fn test_publish_from_async_context() {
        let sink = Arc::new(MemoryEventSink::new());
        let publisher = Publisher::new(sink.clone(), "topic", Duration::from_secs(5)).unwrap();
        assert_eq!(publisher.publish(&make_event("rmap:ev1")), PublishOutcome::Delivered);
        drop(publisher);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_publish_failure_is_reported_not_raised() {
        let publisher = Publisher::new(Arc::new(FailingSink), "topic", Duration::from_secs(5)).unwrap();
        match publisher.publish(&make_event("rmap:ev1")) {
            PublishOutcome::Failed(msg) => assert!(msg.contains("broker unavailable")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_publish_times_out() {
        let publisher = Publisher::new(
            Arc::new(SlowSink(Duration::from_millis(500))),
            "topic",
            Duration::from_millis(20),
        )
        .unwrap();
        assert_eq!(publisher.publish(&make_event("rmap:ev1")), PublishOutcome::TimedOut);
    }

    #[test]
    fn test_staged_events_flush_in_order_and_discard() {
        let sink = Arc::new(MemoryEventSink::new());
        let publisher = Publisher::new(sink.clone(), "topic", Duration::from_secs(5)).unwrap();

        publisher.stage(make_event("rmap:ev1"));
        publisher.discard();
        assert!(publisher.flush().is_empty());

        publisher.stage(make_event("rmap:ev2"));
        publisher.stage(make_event("rmap:ev3"));
        assert_eq!(publisher.flush().len(), 2);
        let keys: Vec<String> = sink.events().into_iter().map(|(_, k, _)| k).collect();
        assert_eq!(keys, vec!["rmap:ev2", "rmap:ev3"]);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlEventSink::new(dir.path().join("events.jsonl"));
        sink.publish("topic", "rmap:ev1", &make_event("rmap:ev1")).unwrap();
        sink.publish("topic", "rmap:ev2", &make_event("rmap:ev2")).unwrap();

        let file = std::fs::File::open(sink.path()).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file).lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);
        let doc: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(doc["key"], "rmap:ev2");
        assert_eq!(doc["event"]["detail"]["type"], "creation");
    }
}
