//! In-memory fakes of the broker and process seams

use crate::broker::{
    BrokerConnector, BrokerSession, InboundMessage, ReplySink, Subscription, Topology,
};
use crate::command::runner::{Invocation, ProcessOutput, ProcessRunner};
use anyhow::{bail, Result};
use async_trait::async_trait;
use cease_shared::Reply;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn message(body: &str, reply_to: &str) -> InboundMessage {
    InboundMessage::new(body.to_string(), Some(reply_to.to_string()))
}

/// Records the order of side effects across fakes
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<&'static str>>>);

impl Journal {
    fn record(&self, entry: &'static str) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct RecordingReplies {
    published: Arc<Mutex<Vec<(String, Reply)>>>,
    fail: bool,
    journal: Option<Journal>,
}

impl RecordingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn published(&self) -> Vec<(String, Reply)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingReplies {
    async fn publish(&self, reply_to: &str, reply: &Reply) -> Result<()> {
        if self.fail {
            bail!("reply channel closed");
        }
        if let Some(journal) = &self.journal {
            journal.record("reply");
        }
        self.published
            .lock()
            .unwrap()
            .push((reply_to.to_string(), reply.clone()));
        Ok(())
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum RunnerMode {
    #[default]
    Succeed,
    ExitFailure,
    SpawnFailure,
}

#[derive(Clone, Default)]
pub struct RecordingRunner {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    mode: RunnerMode,
    delay: Option<Duration>,
    journal: Option<Journal>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_exit() -> Self {
        Self {
            mode: RunnerMode::ExitFailure,
            ..Self::default()
        }
    }

    pub fn failing_spawn() -> Self {
        Self {
            mode: RunnerMode::SpawnFailure,
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Sleep before recording, like a process that takes a while to finish
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        if self.mode == RunnerMode::SpawnFailure {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(journal) = &self.journal {
            journal.record("run");
        }
        self.invocations.lock().unwrap().push(invocation.clone());

        let success = self.mode == RunnerMode::Succeed;
        Ok(ProcessOutput {
            success,
            status: if success { "exit status: 0" } else { "exit status: 1" }.into(),
            output: invocation.args.join(" "),
        })
    }
}

/// Handle a test uses to feed and observe one fake session
pub struct SessionHandle {
    pub deliveries: UnboundedSender<Result<InboundMessage>>,
    pub replies: RecordingReplies,
    pub closed: Arc<AtomicBool>,
}

pub struct FakeSession {
    queue: String,
    deliveries: Mutex<Option<UnboundedReceiver<Result<InboundMessage>>>>,
    replies: RecordingReplies,
    fail_subscribe: bool,
    closed: Arc<AtomicBool>,
}

impl FakeSession {
    pub fn new(queue: &str, replies: RecordingReplies) -> (Self, SessionHandle) {
        let (tx, rx) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let session = Self {
            queue: queue.to_string(),
            deliveries: Mutex::new(Some(rx)),
            replies: replies.clone(),
            fail_subscribe: false,
            closed: closed.clone(),
        };
        let handle = SessionHandle {
            deliveries: tx,
            replies,
            closed,
        };
        (session, handle)
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }
}

#[async_trait]
impl BrokerSession for FakeSession {
    type Replies = RecordingReplies;

    async fn subscribe(&mut self, _topology: &Topology) -> Result<Subscription<Self::Replies>> {
        if self.fail_subscribe {
            bail!("ACCESS_REFUSED - exchange declare rejected");
        }
        let Some(deliveries) = self.deliveries.lock().unwrap().take() else {
            bail!("session already subscribed");
        };
        Ok(Subscription {
            queue: self.queue.clone(),
            deliveries: deliveries.boxed(),
            replies: self.replies.clone(),
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Refuses the first `failures` dials, then hands out queued sessions
pub struct FakeConnector {
    failures: u32,
    attempts: Arc<AtomicU32>,
    sessions: Mutex<VecDeque<FakeSession>>,
}

impl FakeConnector {
    pub fn new(failures: u32, sessions: Vec<FakeSession>) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicU32::new(0)),
            sessions: Mutex::new(sessions.into()),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> Result<Self::Session> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            bail!("connection refused");
        }
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(session) => Ok(session),
            None => bail!("connection refused"),
        }
    }

    fn endpoint(&self) -> &str {
        "amqp://fake:5672"
    }
}
