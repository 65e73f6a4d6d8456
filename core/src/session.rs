use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use phonepilot_backend_client::ByteStream;
use phonepilot_backend_client::Client;
use phonepilot_backend_client::TaskRequest;
use phonepilot_protocol::AbortedEvent;
use phonepilot_protocol::ErrorEvent;
use phonepilot_protocol::ExecutionStep;
use phonepilot_protocol::TaskEvent;
use phonepilot_protocol::TaskOutcome;
use phonepilot_protocol::TaskVariant;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::coalescer::ThinkingCoalescer;
use crate::conversation::Applied;
use crate::conversation::Conversation;
use crate::conversation::DEFAULT_ABORT_MESSAGE;
use crate::envelope::EnvelopeParser;

/// Surfaced when the transport ends without a terminal record.
pub const STREAM_ENDED_EARLY: &str = "stream ended unexpectedly";

const SUPERSEDED_MESSAGE: &str = "Superseded by a newer task";

/// Observer-facing update, emitted after the corresponding transition has
/// been applied to the conversation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// A coalesced batch of thinking fragments.
    Thinking { text: String },
    /// An execution step was appended to the trace.
    Step { step: ExecutionStep },
    /// Interim assistant text replaced the message content.
    AssistantMessage { content: String },
    /// Terminal transition; nothing follows on this channel.
    Finished { outcome: TaskOutcome },
}

struct Session {
    assistant_id: Uuid,
    cancel: CancellationToken,
    updates_tx: mpsc::Sender<SessionUpdate>,
    join: JoinHandle<()>,
}

/// Owns the one outstanding task stream for a device.
///
/// `send` opens a transport and spawns the pump that folds records into the
/// conversation; issuing another `send` closes the previous transport first,
/// so at most one stream is ever open per device. Abort closes the transport,
/// applies the local `aborted` transition before returning, then notifies the
/// backend without waiting for it.
pub struct SessionController {
    client: Arc<Client>,
    device_id: String,
    conversation: Arc<Mutex<Conversation>>,
    idle_timeout: Duration,
    flush_window: Duration,
    current: Option<Session>,
}

impl SessionController {
    pub fn new(
        client: Arc<Client>,
        device_id: impl Into<String>,
        variant: TaskVariant,
        idle_timeout: Duration,
        flush_window: Duration,
    ) -> Self {
        let device_id = device_id.into();
        Self {
            client,
            conversation: Arc::new(Mutex::new(Conversation::new(&device_id, variant))),
            device_id,
            idle_timeout,
            flush_window,
            current: None,
        }
    }

    pub fn conversation(&self) -> Arc<Mutex<Conversation>> {
        self.conversation.clone()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Opens a new task stream and returns the update channel for this turn.
    pub async fn send(&mut self, text: String) -> mpsc::Receiver<SessionUpdate> {
        self.close_current(Some(SUPERSEDED_MESSAGE)).await;

        let (variant, assistant_id) = {
            let mut conversation = self.conversation.lock().await;
            (conversation.variant(), conversation.begin_turn(text.clone()))
        };
        let request = TaskRequest {
            device_id: self.device_id.clone(),
            message: text,
        };
        let (updates_tx, updates_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_stream(StreamTask {
            client: self.client.clone(),
            conversation: self.conversation.clone(),
            variant,
            request,
            target: assistant_id,
            cancel: cancel.clone(),
            updates: updates_tx.clone(),
            idle_timeout: self.idle_timeout,
            flush_window: self.flush_window,
        }));
        self.current = Some(Session {
            assistant_id,
            cancel,
            updates_tx,
            join,
        });
        updates_rx
    }

    /// User-initiated abort. Idempotent: a second call, or a call after the
    /// stream finished naturally, does nothing.
    pub async fn abort(&mut self) {
        if self.close_current(None).await {
            let client = self.client.clone();
            let device_id = self.device_id.clone();
            tokio::spawn(async move {
                // Local state is already terminal; a failed notification is
                // logged and never surfaced.
                if let Err(err) = client.cancel_task(&device_id).await {
                    warn!("backend cancellation notification failed: {err}");
                }
            });
        }
    }

    /// Panel teardown: release the transport and pump task.
    pub async fn shutdown(&mut self) {
        self.close_current(None).await;
    }

    /// Closes the current session if any. Returns true when this call
    /// performed the terminal transition (as opposed to the stream already
    /// having delivered one, or there being no session at all).
    async fn close_current(&mut self, message: Option<&str>) -> bool {
        let Some(session) = self.current.take() else {
            return false;
        };
        session.cancel.cancel();
        // The pump exits promptly on cancellation without touching the
        // conversation again.
        let _ = session.join.await;
        let event = TaskEvent::Aborted(AbortedEvent {
            message: message.map(str::to_string),
        });
        let applied = self
            .conversation
            .lock()
            .await
            .apply(session.assistant_id, &event);
        if matches!(applied, Applied::Terminal) {
            let outcome = TaskOutcome::Aborted {
                message: message.unwrap_or(DEFAULT_ABORT_MESSAGE).to_string(),
            };
            let _ = session.updates_tx.try_send(SessionUpdate::Finished { outcome });
            true
        } else {
            false
        }
    }
}

struct StreamTask {
    client: Arc<Client>,
    conversation: Arc<Mutex<Conversation>>,
    variant: TaskVariant,
    request: TaskRequest,
    target: Uuid,
    cancel: CancellationToken,
    updates: mpsc::Sender<SessionUpdate>,
    idle_timeout: Duration,
    flush_window: Duration,
}

async fn run_stream(task: StreamTask) {
    let open = tokio::select! {
        _ = task.cancel.cancelled() => return,
        open = task.client.stream_task(task.variant, &task.request) => open,
    };
    let stream = match open {
        Ok(stream) => stream.bytes,
        Err(err) => {
            apply_stream_error(
                &task.conversation,
                task.target,
                &task.updates,
                format!("failed to reach the agent backend: {err}"),
            )
            .await;
            return;
        }
    };
    pump_records(stream, &task).await;
}

/// Reads the byte stream to completion, turning records into conversation
/// transitions. Thinking fragments pass through the coalescer; any other
/// record forces a flush first so finalized blocks keep their tail.
async fn pump_records(mut stream: ByteStream, task: &StreamTask) {
    let mut parser = EnvelopeParser::new();
    let mut coalescer = ThinkingCoalescer::new(task.flush_window);
    loop {
        tokio::select! {
            _ = task.cancel.cancelled() => {
                // The abort path owns the terminal transition; buffered
                // fragments die with the session.
                coalescer.clear();
                return;
            }
            _ = sleep_until_deadline(coalescer.deadline()) => {
                flush_thinking(&mut coalescer, task).await;
            }
            next = tokio::time::timeout(task.idle_timeout, stream.next()) => {
                match next {
                    Err(_) => {
                        flush_thinking(&mut coalescer, task).await;
                        apply_stream_error(
                            &task.conversation,
                            task.target,
                            &task.updates,
                            format!("{STREAM_ENDED_EARLY}: no data within idle timeout"),
                        )
                        .await;
                        return;
                    }
                    Ok(Some(Ok(chunk))) => {
                        for event in parser.push_bytes(&chunk) {
                            if handle_event(event, &mut coalescer, task).await == Flow::Terminal {
                                return;
                            }
                        }
                    }
                    Ok(Some(Err(err))) => {
                        flush_thinking(&mut coalescer, task).await;
                        apply_stream_error(
                            &task.conversation,
                            task.target,
                            &task.updates,
                            format!("{STREAM_ENDED_EARLY}: {err}"),
                        )
                        .await;
                        return;
                    }
                    Ok(None) => {
                        for event in parser.finish() {
                            if handle_event(event, &mut coalescer, task).await == Flow::Terminal {
                                return;
                            }
                        }
                        flush_thinking(&mut coalescer, task).await;
                        apply_stream_error(
                            &task.conversation,
                            task.target,
                            &task.updates,
                            STREAM_ENDED_EARLY.to_string(),
                        )
                        .await;
                        return;
                    }
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Terminal,
}

async fn handle_event(
    event: TaskEvent,
    coalescer: &mut ThinkingCoalescer,
    task: &StreamTask,
) -> Flow {
    if let TaskEvent::ThinkingChunk(chunk) = &event {
        coalescer.push(&chunk.text);
        return Flow::Continue;
    }
    flush_thinking(coalescer, task).await;

    let outcome = terminal_outcome(&event);
    let applied = task
        .conversation
        .lock()
        .await
        .apply(task.target, &event);
    match applied {
        Applied::Step(step) => {
            let _ = task.updates.send(SessionUpdate::Step { step }).await;
            Flow::Continue
        }
        Applied::Updated => {
            if let TaskEvent::Message(interim) = &event {
                let _ = task
                    .updates
                    .send(SessionUpdate::AssistantMessage {
                        content: interim.content.clone(),
                    })
                    .await;
            }
            Flow::Continue
        }
        Applied::Terminal => {
            if let Some(outcome) = outcome {
                let _ = task.updates.send(SessionUpdate::Finished { outcome }).await;
            }
            Flow::Terminal
        }
        Applied::Dropped => {
            debug!("record dropped after terminal state; pump continues draining");
            Flow::Continue
        }
    }
}

fn terminal_outcome(event: &TaskEvent) -> Option<TaskOutcome> {
    match event {
        TaskEvent::Done(done) => Some(TaskOutcome::Completed {
            message: done.message.clone(),
            success: done.success,
            steps: done.steps,
        }),
        TaskEvent::Error(error) => Some(TaskOutcome::Failed {
            message: error.message.clone(),
        }),
        TaskEvent::Aborted(aborted) => Some(TaskOutcome::Aborted {
            message: aborted
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_ABORT_MESSAGE.to_string()),
        }),
        TaskEvent::ThinkingChunk(_)
        | TaskEvent::Step(_)
        | TaskEvent::ToolCall(_)
        | TaskEvent::ToolResult(_)
        | TaskEvent::Message(_) => None,
    }
}

async fn flush_thinking(coalescer: &mut ThinkingCoalescer, task: &StreamTask) {
    if let Some(text) = coalescer.take() {
        let applied = task
            .conversation
            .lock()
            .await
            .apply_thinking(task.target, text.clone());
        if !matches!(applied, Applied::Dropped) {
            let _ = task.updates.send(SessionUpdate::Thinking { text }).await;
        }
    }
}

async fn apply_stream_error(
    conversation: &Arc<Mutex<Conversation>>,
    target: Uuid,
    updates: &mpsc::Sender<SessionUpdate>,
    message: String,
) {
    let applied = conversation.lock().await.apply(
        target,
        &TaskEvent::Error(ErrorEvent {
            message: message.clone(),
        }),
    );
    if matches!(applied, Applied::Terminal) {
        let _ = updates
            .send(SessionUpdate::Finished {
                outcome: TaskOutcome::Failed { message },
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use phonepilot_protocol::StepKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_partial_json;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    const IDLE: Duration = Duration::from_secs(5);
    const FLUSH: Duration = Duration::from_millis(50);

    fn controller(server: &MockServer, variant: TaskVariant) -> SessionController {
        let client = Arc::new(Client::new(server.uri()).unwrap());
        SessionController::new(client, "dev-1", variant, IDLE, FLUSH)
    }

    async fn collect(mut rx: mpsc::Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            let finished = matches!(update, SessionUpdate::Finished { .. });
            updates.push(update);
            if finished {
                break;
            }
        }
        updates
    }

    fn stream_body(lines: &[serde_json::Value]) -> String {
        let mut body = String::new();
        for line in lines {
            body.push_str(&format!("data: {line}\n"));
        }
        body
    }

    #[tokio::test]
    async fn direct_run_streams_to_completion() {
        let server = MockServer::start().await;
        let body = stream_body(&[
            json!({"type": "thinking_chunk", "text": "He"}),
            json!({"type": "thinking_chunk", "text": "llo"}),
            json!({"type": "step", "thinking": "", "action": {"a": 1}, "step": 1}),
            json!({"type": "done", "message": "ok", "success": true, "steps": 1}),
        ]);
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let mut controller = controller(&server, TaskVariant::Direct);
        let rx = controller.send("open settings".into()).await;
        let updates = collect(rx).await;

        assert_matches!(
            &updates[..],
            [
                SessionUpdate::Thinking { text },
                SessionUpdate::Step { step },
                SessionUpdate::Finished {
                    outcome: TaskOutcome::Completed { message, success: true, steps: 1 },
                },
            ] if text == "Hello" && step.kind == StepKind::Thinking && message == "ok"
        );

        let conversation = controller.conversation();
        let conversation = conversation.lock().await;
        let assistant = conversation.messages().last().unwrap();
        assert_eq!(assistant.thinking_blocks, vec!["Hello".to_string()]);
        assert_eq!(assistant.actions, vec![json!({"a": 1})]);
        assert_eq!(assistant.step_count, 1);
        assert_eq!(assistant.content, "ok");
        assert_eq!(assistant.success, Some(true));
        assert!(!assistant.is_streaming);
    }

    #[tokio::test]
    async fn orchestrated_run_emits_tool_steps_and_late_records_are_dropped() {
        let server = MockServer::start().await;
        let body = stream_body(&[
            json!({"type": "tool_call", "name": "chat", "args": {"message": "go"}}),
            json!({"type": "tool_result", "name": "chat", "result": "done"}),
            json!({"type": "error", "message": "boom"}),
            // Delivered after the terminal record; must have no effect.
            json!({"type": "done", "message": "too late", "success": true, "steps": 7}),
        ]);
        Mock::given(method("POST"))
            .and(path("/api/agent/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let mut controller = controller(&server, TaskVariant::Orchestrated);
        let rx = controller.send("go".into()).await;
        let updates = collect(rx).await;

        assert_matches!(
            &updates[..],
            [
                SessionUpdate::Step { step: call },
                SessionUpdate::Step { step: result },
                SessionUpdate::Finished {
                    outcome: TaskOutcome::Failed { message },
                },
            ] if call.kind == StepKind::ToolCall && result.kind == StepKind::ToolResult
                && message == "boom"
        );

        let conversation = controller.conversation();
        let conversation = conversation.lock().await;
        let assistant = conversation.messages().last().unwrap();
        assert_eq!(assistant.content, "Error: boom");
        assert_eq!(assistant.success, Some(false));
        assert_eq!(assistant.steps.len(), 2);
    }

    #[tokio::test]
    async fn empty_stream_surfaces_a_terminal_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
            .mount(&server)
            .await;

        let mut controller = controller(&server, TaskVariant::Direct);
        let rx = controller.send("hello".into()).await;
        let updates = collect(rx).await;

        assert_matches!(
            &updates[..],
            [SessionUpdate::Finished {
                outcome: TaskOutcome::Failed { message },
            }] if message == STREAM_ENDED_EARLY
        );
        let conversation = controller.conversation();
        let conversation = conversation.lock().await;
        let assistant = conversation.messages().last().unwrap();
        assert!(!assistant.is_streaming);
        assert_eq!(assistant.success, Some(false));
        assert!(assistant.content.contains(STREAM_ENDED_EARLY));
    }

    #[tokio::test]
    async fn open_failure_surfaces_a_terminal_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(ResponseTemplate::new(503).set_body_string("agent not ready"))
            .mount(&server)
            .await;

        let mut controller = controller(&server, TaskVariant::Direct);
        let rx = controller.send("hello".into()).await;
        let updates = collect(rx).await;

        assert_matches!(
            &updates[..],
            [SessionUpdate::Finished {
                outcome: TaskOutcome::Failed { message },
            }] if message.contains("failed to reach the agent backend")
        );
    }

    #[tokio::test]
    async fn second_send_supersedes_the_first_session() {
        let server = MockServer::start().await;
        // The first stream hangs long enough to still be open when the second
        // send arrives.
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .and(body_partial_json(json!({"message": "first"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_raw("", "text/event-stream"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .and(body_partial_json(json!({"message": "second"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                stream_body(&[json!({"type": "done", "message": "ok", "success": true, "steps": 0})]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let mut controller = controller(&server, TaskVariant::Direct);
        let first_rx = controller.send("first".into()).await;
        let second_rx = controller.send("second".into()).await;

        let first_updates = collect(first_rx).await;
        assert_matches!(
            &first_updates[..],
            [SessionUpdate::Finished {
                outcome: TaskOutcome::Aborted { message },
            }] if message == SUPERSEDED_MESSAGE
        );

        let second_updates = collect(second_rx).await;
        assert_matches!(
            second_updates.last(),
            Some(SessionUpdate::Finished {
                outcome: TaskOutcome::Completed { success: true, .. },
            })
        );

        let conversation = controller.conversation();
        let conversation = conversation.lock().await;
        let assistants: Vec<_> = conversation
            .messages()
            .iter()
            .filter(|m| m.role == phonepilot_protocol::Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 2);
        assert_eq!(assistants[0].content, SUPERSEDED_MESSAGE);
        assert_eq!(assistants[0].success, Some(false));
        assert!(!assistants[0].is_streaming);
        assert_eq!(assistants[1].content, "ok");
    }

    #[tokio::test]
    async fn abort_applies_local_transition_and_notifies_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_raw("", "text/event-stream"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/abort"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let mut controller = controller(&server, TaskVariant::Direct);
        let rx = controller.send("slow task".into()).await;
        controller.abort().await;

        // The local transition is applied before abort() returns.
        {
            let conversation = controller.conversation();
            let conversation = conversation.lock().await;
            let assistant = conversation.messages().last().unwrap();
            assert!(!assistant.is_streaming);
            assert_eq!(assistant.content, DEFAULT_ABORT_MESSAGE);
            assert_eq!(assistant.success, Some(false));
        }

        let updates = collect(rx).await;
        assert_matches!(
            &updates[..],
            [SessionUpdate::Finished {
                outcome: TaskOutcome::Aborted { .. },
            }]
        );

        // The backend notification is fire-and-forget; give it a moment.
        let mut notified = false;
        for _ in 0..50 {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests.iter().any(|r| r.url.path() == "/api/chat/abort") {
                notified = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(notified, "backend was never told about the cancellation");

        // A second abort is a no-op.
        controller.abort().await;
    }

    /// Byte stream that tests can feed chunk by chunk, the way a chunked
    /// transport would deliver them.
    fn byte_channel() -> (
        mpsc::UnboundedSender<Result<bytes::Bytes, phonepilot_backend_client::ClientError>>,
        ByteStream,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream: ByteStream = Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        (tx, stream)
    }

    fn stream_task(
        conversation: Arc<Mutex<Conversation>>,
        target: Uuid,
        cancel: CancellationToken,
        updates: mpsc::Sender<SessionUpdate>,
        flush_window: Duration,
    ) -> StreamTask {
        StreamTask {
            client: Arc::new(Client::new("http://127.0.0.1:9").unwrap()),
            conversation,
            variant: TaskVariant::Direct,
            request: TaskRequest {
                device_id: "dev-1".into(),
                message: "task".into(),
            },
            target,
            cancel,
            updates,
            idle_timeout: IDLE,
            flush_window,
        }
    }

    #[tokio::test]
    async fn debounce_window_flushes_buffered_thinking_on_its_own() {
        let (tx, stream) = byte_channel();
        let conversation = Arc::new(Mutex::new(Conversation::new("dev-1", TaskVariant::Direct)));
        let target = conversation.lock().await.begin_turn("task".into());
        let (updates_tx, mut updates_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = stream_task(conversation.clone(), target, cancel, updates_tx, FLUSH);
        let pump = tokio::spawn(async move { pump_records(stream, &task).await });

        tx.send(Ok(bytes::Bytes::from_static(
            b"data: {\"type\":\"thinking_chunk\",\"text\":\"He\"}\ndata: {\"type\":\"thinking_chunk\",\"text\":\"llo\"}\n",
        )))
        .unwrap();

        // No step record follows; the debounce window flushes the burst.
        let update = tokio::time::timeout(Duration::from_secs(2), updates_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            update,
            SessionUpdate::Thinking {
                text: "Hello".to_string()
            }
        );

        tx.send(Ok(bytes::Bytes::from_static(
            b"data: {\"type\":\"done\",\"message\":\"ok\",\"success\":true,\"steps\":0}\n",
        )))
        .unwrap();
        let update = tokio::time::timeout(Duration::from_secs(2), updates_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_matches!(
            update,
            SessionUpdate::Finished {
                outcome: TaskOutcome::Completed { success: true, .. },
            }
        );
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_the_pump_without_a_terminal_transition() {
        let (tx, stream) = byte_channel();
        let conversation = Arc::new(Mutex::new(Conversation::new("dev-1", TaskVariant::Direct)));
        let target = conversation.lock().await.begin_turn("task".into());
        let (updates_tx, mut updates_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        // A wide flush window so the only way anything is emitted is a bug.
        let task = stream_task(
            conversation.clone(),
            target,
            cancel.clone(),
            updates_tx,
            Duration::from_secs(5),
        );
        let pump = tokio::spawn(async move { pump_records(stream, &task).await });

        tx.send(Ok(bytes::Bytes::from_static(
            b"data: {\"type\":\"thinking_chunk\",\"text\":\"buffered\"}\n",
        )))
        .unwrap();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), pump)
            .await
            .unwrap()
            .unwrap();

        // The abort path owns the terminal transition; the pump exits
        // without touching the message or emitting updates.
        let conversation = conversation.lock().await;
        let assistant = conversation.messages().last().unwrap();
        assert!(assistant.is_streaming);
        assert!(updates_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn abort_after_natural_completion_is_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                stream_body(&[json!({"type": "done", "message": "ok", "success": true, "steps": 0})]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let mut controller = controller(&server, TaskVariant::Direct);
        let rx = controller.send("quick task".into()).await;
        let updates = collect(rx).await;
        assert_matches!(
            updates.last(),
            Some(SessionUpdate::Finished {
                outcome: TaskOutcome::Completed { .. },
            })
        );

        controller.abort().await;
        let conversation = controller.conversation();
        let conversation = conversation.lock().await;
        let assistant = conversation.messages().last().unwrap();
        // Still the natural result, not an abort overlay.
        assert_eq!(assistant.content, "ok");
        assert_eq!(assistant.success, Some(true));

        // No cancellation call was sent for an already-finished session.
        let requests = server.received_requests().await.unwrap_or_default();
        assert!(!requests.iter().any(|r| r.url.path() == "/api/chat/abort"));
    }
}
