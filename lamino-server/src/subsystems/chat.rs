//! Chat relay
//!
//! Turns a chat request into an upstream completion call, records both sides
//! of the exchange in the workspace history and attaches routing metadata plus
//! a decision chain to the reply. Streaming replies are relayed event by event
//! as they arrive.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::sse::{Event, Sse};
use chrono::Utc;
use futures::{Stream, StreamExt};
use lamino_core::config::ChatConfig;
use lamino_core::models::workspace::{DEFAULT_MODEL, DEFAULT_POLICY, DEFAULT_PROVIDER};
use lamino_core::models::{ChatMetadata, FileKind, Message, Role, UploadedFile, User, WorkspaceSettings};
use lamino_core::upstream::{
    delta_content, parse_stream_line, ChatCompletionRequest, ChatMessage, LineBuffer,
    RoutingHeaders, StreamLine, UpstreamCall,
};
use lamino_core::{
    build_decision_chain, ChatUpstream, FileStore, ProviderRegistry, RoutingTrace, UpstreamError,
    WorkspaceStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::subsystems::workspaces::load_accessible;

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub message: String,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub policy: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub metadata: ChatMetadata,
}

/// A validated chat turn whose user message is already in history.
pub struct PreparedChat {
    pub workspace_id: Option<String>,
    pub model: String,
    pub provider: String,
    pub policy: String,
    pub call: UpstreamCall,
    pub upstream: Arc<dyn ChatUpstream>,
    pub started: Instant,
}

/// Use the caller's value unless it is empty or the sentinel default, in which
/// case the workspace's stored value wins.
fn pick(requested: Option<String>, sentinel: &str, stored: Option<&str>) -> String {
    match requested.filter(|v| !v.is_empty() && v != sentinel) {
        Some(v) => v,
        None => stored.unwrap_or(sentinel).to_string(),
    }
}

/// Append a note about attached documents. Images are referenced by id only.
pub fn annotate_attachments(message: &str, attachments: &[UploadedFile]) -> String {
    let notes: String = attachments
        .iter()
        .filter(|f| f.kind == FileKind::Document)
        .map(|f| format!("\n[Attached file: {} ({})]\n", f.name, f.extension))
        .collect();
    if notes.is_empty() {
        message.to_string()
    } else {
        format!("{message}\n\n--- Attached Files ---{notes}")
    }
}

async fn load_attachments(
    files: &dyn FileStore,
    ids: &[String],
) -> Result<Vec<UploadedFile>, GatewayError> {
    let mut found = Vec::new();
    for id in ids {
        let Ok(uuid) = Uuid::parse_str(id) else {
            continue;
        };
        if let Some(file) = files.get(uuid).await? {
            found.push(file);
        }
    }
    Ok(found)
}

/// Validate the request, assemble the upstream message list and record the
/// user turn. Nothing is written when validation fails.
pub async fn prepare_chat(
    workspaces: &dyn WorkspaceStore,
    files: &dyn FileStore,
    providers: &ProviderRegistry,
    limits: &ChatConfig,
    user: &User,
    req: ChatRequest,
) -> Result<PreparedChat, GatewayError> {
    if req.message.is_empty() && req.files.is_empty() {
        return Err(GatewayError::Validation("Message or files required".into()));
    }

    let workspace_id = req.workspace_id.filter(|id| !id.is_empty());
    let workspace = match &workspace_id {
        Some(id) => Some(load_accessible(workspaces, user, id).await.map_err(|e| match e {
            GatewayError::Forbidden(_) => {
                GatewayError::Forbidden("Access denied to this workspace".into())
            }
            other => other,
        })?),
        None => None,
    };

    let model = pick(req.model, DEFAULT_MODEL, workspace.as_ref().map(|w| w.model.as_str()));
    let provider = pick(
        req.provider,
        DEFAULT_PROVIDER,
        workspace.as_ref().map(|w| w.provider.as_str()),
    );
    let policy = pick(
        req.policy,
        DEFAULT_POLICY,
        workspace.as_ref().map(|w| w.settings.policy.as_str()),
    );
    let settings = workspace
        .as_ref()
        .map(|w| w.settings.clone())
        .unwrap_or_else(WorkspaceSettings::default);

    let mut messages = Vec::new();
    if let Some(ws) = workspace.as_ref().filter(|w| !w.system_prompt.is_empty()) {
        messages.push(ChatMessage {
            role: Role::System,
            content: ws.system_prompt.clone(),
        });
    }
    if let Some(id) = &workspace_id {
        for past in workspaces.recent_history(id, limits.history_window).await? {
            messages.push(ChatMessage {
                role: past.role,
                content: past.content,
            });
        }
    }
    let attachments = load_attachments(files, &req.files).await?;
    messages.push(ChatMessage {
        role: Role::User,
        content: annotate_attachments(&req.message, &attachments),
    });

    if let Some(id) = &workspace_id {
        workspaces
            .append_message(id, Message::user(req.message, req.files, &model, &provider))
            .await?;
    }

    let upstream = providers.resolve(&provider).ok_or_else(|| GatewayError::BadGateway {
        provider: provider.clone(),
        model: model.clone(),
        message: "No upstream configured".into(),
    })?;

    tracing::info!(
        user = %user.subject_id,
        workspace = workspace_id.as_deref().unwrap_or(""),
        provider = %provider,
        model = %model,
        policy = %policy,
        stream = req.stream,
        "Relaying chat"
    );

    Ok(PreparedChat {
        workspace_id,
        call: UpstreamCall {
            request: ChatCompletionRequest {
                model: model.clone(),
                messages,
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
                stream: req.stream,
            },
            policy: policy.clone(),
        },
        model,
        provider,
        policy,
        upstream,
        started: Instant::now(),
    })
}

impl PreparedChat {
    fn metadata(&self, routing: &RoutingHeaders, usage: Value) -> ChatMetadata {
        let route = routing.route.clone().unwrap_or_else(|| self.provider.clone());
        let upstream = routing
            .upstream
            .clone()
            .unwrap_or_else(|| self.provider.clone());
        let model_actual = routing.model.clone().unwrap_or_else(|| self.model.clone());
        let fallback_reason = routing.fallback_reason.clone().unwrap_or_default();

        let decision_chain = build_decision_chain(&RoutingTrace {
            provider: &self.provider,
            model_requested: &self.model,
            route: &route,
            upstream: &upstream,
            actual_model: &model_actual,
            policy: &self.policy,
            fallback_reason: &fallback_reason,
        });

        ChatMetadata {
            model_requested: self.model.clone(),
            model_actual,
            provider: self.provider.clone(),
            route,
            upstream,
            latency_ms: self.started.elapsed().as_millis() as u64,
            router_latency_ms: routing.latency_ms,
            policy: self.policy.clone(),
            fallback_reason,
            decision_chain,
            usage,
            timestamp: Utc::now(),
        }
    }

    fn upstream_error(&self, err: UpstreamError, body_limit: usize) -> GatewayError {
        let provider = self.provider.clone();
        let model = self.model.clone();
        match err {
            UpstreamError::Timeout => GatewayError::UpstreamTimeout { provider, model },
            UpstreamError::Rejected { status, body } => GatewayError::UpstreamRejected {
                status,
                body: body.chars().take(body_limit).collect(),
                provider,
                model,
            },
            other => GatewayError::BadGateway {
                provider,
                model,
                message: other.to_string(),
            },
        }
    }

    async fn record_reply(&self, store: &dyn WorkspaceStore, content: String, meta: &ChatMetadata) {
        let Some(id) = &self.workspace_id else {
            return;
        };
        if let Err(e) = store
            .append_message(id, Message::assistant(content, meta))
            .await
        {
            tracing::warn!(workspace = %id, error = %e, "Assistant turn not recorded");
        }
    }
}

/// Non-streaming relay. Upstream failures leave only the user turn in history.
pub async fn complete_chat(
    store: &dyn WorkspaceStore,
    limits: &ChatConfig,
    chat: PreparedChat,
) -> Result<ChatReply, GatewayError> {
    let completion = match chat.upstream.complete(&chat.call).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(provider = %chat.provider, model = %chat.model, error = %e, "Chat completion failed");
            return Err(chat.upstream_error(e, limits.error_body_limit));
        }
    };

    let content = completion.content();
    let metadata = chat.metadata(&completion.routing, completion.usage());
    chat.record_reply(store, content.clone(), &metadata).await;

    tracing::info!(
        provider = %metadata.provider,
        model_actual = %metadata.model_actual,
        latency_ms = metadata.latency_ms,
        "Chat completed"
    );
    Ok(ChatReply {
        response: content,
        metadata,
    })
}

/// One event of a streamed reply, in the order the client receives them.
#[derive(Debug)]
pub enum RelayEvent {
    /// An upstream `data:` payload, forwarded as is.
    Chunk(String),
    /// `{"error", "provider", "model"}`; at most one per stream.
    Error(Value),
    Metadata(ChatMetadata),
    Done,
}

impl RelayEvent {
    pub fn into_sse(self) -> Event {
        let json = |v: Value| {
            Event::default()
                .json_data(&v)
                .unwrap_or_else(|_| Event::default().data("{}"))
        };
        match self {
            RelayEvent::Chunk(payload) => Event::default().data(payload),
            RelayEvent::Error(body) => json(body),
            RelayEvent::Metadata(metadata) => json(serde_json::json!({ "metadata": metadata })),
            RelayEvent::Done => Event::default().data("[DONE]"),
        }
    }
}

/// Streaming relay.
///
/// Upstream `data:` payloads are forwarded verbatim. Any failure becomes one
/// error event. The stream always ends with a metadata event and `[DONE]`,
/// after which the assistant turn is recorded. Dropping the stream early
/// abandons the upstream request and records nothing.
pub fn relay_stream(
    store: Arc<dyn WorkspaceStore>,
    limits: ChatConfig,
    chat: PreparedChat,
) -> impl Stream<Item = RelayEvent> + Send + 'static {
    let idle = Duration::from_secs(limits.request_timeout_secs);

    async_stream::stream! {
        let mut content = String::new();
        let mut usage = Value::Object(Default::default());
        let mut routing = RoutingHeaders::default();

        match chat.upstream.open_stream(&chat.call).await {
            Ok(mut upstream) => {
                routing = upstream.routing.clone();
                let mut lines = LineBuffer::default();
                let mut done = false;

                while !done {
                    let batch: Vec<String> = match tokio::time::timeout(idle, upstream.events.next()).await {
                        Ok(Some(Ok(chunk))) => lines.push(&chunk),
                        Ok(None) => {
                            done = true;
                            std::mem::take(&mut lines).finish().into_iter().collect()
                        }
                        Ok(Some(Err(e))) => {
                            tracing::warn!(provider = %chat.provider, model = %chat.model, error = %e, "Chat stream broke off");
                            yield RelayEvent::Error(chat.upstream_error(e, limits.error_body_limit).body());
                            break;
                        }
                        Err(_) => {
                            tracing::warn!(provider = %chat.provider, model = %chat.model, "Chat stream idle timeout");
                            yield RelayEvent::Error(chat.upstream_error(UpstreamError::Timeout, 0).body());
                            break;
                        }
                    };

                    for line in batch {
                        let payload = match parse_stream_line(&line) {
                            Some(StreamLine::Data(payload)) => payload,
                            Some(StreamLine::Done) => {
                                done = true;
                                break;
                            }
                            None => continue,
                        };
                        let Ok(chunk) = serde_json::from_str::<Value>(&payload) else {
                            continue;
                        };
                        if let Some(delta) = delta_content(&chunk) {
                            content.push_str(delta);
                        }
                        if let Some(u) = chunk.get("usage").filter(|u| u.is_object()) {
                            usage = u.clone();
                        }
                        yield RelayEvent::Chunk(payload);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(provider = %chat.provider, model = %chat.model, error = %e, "Chat stream failed to open");
                yield RelayEvent::Error(chat.upstream_error(e, limits.error_body_limit).body());
            }
        }

        let metadata = chat.metadata(&routing, usage);
        yield RelayEvent::Metadata(metadata.clone());
        yield RelayEvent::Done;

        chat.record_reply(store.as_ref(), content, &metadata).await;
        tracing::info!(provider = %metadata.provider, latency_ms = metadata.latency_ms, "Chat stream finished");
    }
}

/// The relay as an axum server-sent-event response.
pub fn relay_sse(
    store: Arc<dyn WorkspaceStore>,
    limits: ChatConfig,
    chat: PreparedChat,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    Sse::new(relay_stream(store, limits, chat).map(|ev| Ok(ev.into_sse())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use lamino_core::models::NewWorkspace;
    use lamino_core::models::Workspace;
    use lamino_core::providers::Provider;
    use lamino_core::upstream::{Completion, CompletionStream};
    use lamino_core::{InMemoryFileStore, InMemoryWorkspaceStore};
    use std::sync::Mutex;

    /// How a scripted stream ends after its chunks.
    #[derive(Default, Clone, Copy)]
    enum StreamEnd {
        #[default]
        Close,
        Break(&'static str),
        Stall,
    }

    /// Upstream double that records calls and replays canned results.
    #[derive(Default)]
    struct ScriptedUpstream {
        calls: Mutex<Vec<UpstreamCall>>,
        fail_with: Option<u16>,
        chunks: Vec<&'static str>,
        end: StreamEnd,
    }

    #[async_trait]
    impl ChatUpstream for ScriptedUpstream {
        fn provider(&self) -> Provider {
            Provider::RainyModel
        }

        async fn complete(&self, call: &UpstreamCall) -> Result<Completion, UpstreamError> {
            self.calls.lock().unwrap().push(call.clone());
            if let Some(status) = self.fail_with {
                return Err(UpstreamError::Rejected {
                    status,
                    body: "x".repeat(800),
                });
            }
            Ok(Completion {
                body: serde_json::json!({
                    "choices": [{ "message": { "content": "pong" } }],
                    "usage": { "total_tokens": 3 }
                }),
                routing: RoutingHeaders {
                    upstream: Some("ollama".into()),
                    model: Some("llama3.1:8b".into()),
                    ..Default::default()
                },
            })
        }

        async fn open_stream(&self, call: &UpstreamCall) -> Result<CompletionStream, UpstreamError> {
            self.calls.lock().unwrap().push(call.clone());
            let chunks: Vec<Result<Bytes, UpstreamError>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            let chunks = futures::stream::iter(chunks);
            let events = match self.end {
                StreamEnd::Close => chunks.boxed(),
                StreamEnd::Break(reason) => chunks
                    .chain(futures::stream::iter([Err(UpstreamError::Transport(
                        reason.to_string(),
                    ))]))
                    .boxed(),
                StreamEnd::Stall => chunks.chain(futures::stream::pending()).boxed(),
            };
            Ok(CompletionStream {
                routing: RoutingHeaders::default(),
                events,
            })
        }
    }

    struct Fixture {
        workspaces: InMemoryWorkspaceStore,
        files: InMemoryFileStore,
        providers: ProviderRegistry,
        upstream: Arc<ScriptedUpstream>,
        user: User,
    }

    fn fixture(upstream: ScriptedUpstream) -> Fixture {
        let upstream = Arc::new(upstream);
        let mut providers = ProviderRegistry::empty();
        providers.register(
            Provider::RainyModel,
            "http://unused".into(),
            "UNUSED".into(),
            upstream.clone(),
        );
        Fixture {
            workspaces: InMemoryWorkspaceStore::new(),
            files: InMemoryFileStore::new(),
            providers,
            upstream,
            user: User::developer(),
        }
    }

    async fn workspace(f: &Fixture, input: NewWorkspace) -> Workspace {
        let ws = Workspace::create(Uuid::new_v4().to_string(), input, &f.user, Utc::now());
        f.workspaces.put(ws.clone()).await.unwrap();
        ws
    }

    async fn prepare(f: &Fixture, req: ChatRequest) -> Result<PreparedChat, GatewayError> {
        prepare_chat(
            &f.workspaces,
            &f.files,
            &f.providers,
            &ChatConfig::default(),
            &f.user,
            req,
        )
        .await
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_side_effects() {
        let f = fixture(ScriptedUpstream::default());
        let ws = workspace(&f, NewWorkspace::default()).await;

        let result = prepare(
            &f,
            ChatRequest {
                workspace_id: Some(ws.id.clone()),
                ..Default::default()
            },
        )
        .await;

        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert!(f.workspaces.history(&ws.id).await.unwrap().is_empty());
        assert!(f.upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_workspace_defaults_replace_sentinels() {
        let f = fixture(ScriptedUpstream::default());
        let ws = workspace(
            &f,
            NewWorkspace {
                model: Some("rainymodel/code".into()),
                system_prompt: Some("Be brief.".into()),
                temperature: Some(0.1),
                policy: Some("premium".into()),
                ..Default::default()
            },
        )
        .await;

        let chat = prepare(
            &f,
            ChatRequest {
                workspace_id: Some(ws.id.clone()),
                message: "hi".into(),
                model: Some("rainymodel/auto".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(chat.model, "rainymodel/code");
        assert_eq!(chat.policy, "premium");
        assert_eq!(chat.call.policy, "premium");
        assert_eq!(chat.call.request.temperature, 0.1);
        assert_eq!(chat.call.request.messages[0].role, Role::System);
        assert_eq!(chat.call.request.messages[0].content, "Be brief.");
    }

    #[tokio::test]
    async fn test_history_window_and_order() {
        let f = fixture(ScriptedUpstream::default());
        let ws = workspace(&f, NewWorkspace::default()).await;
        for i in 0..30 {
            f.workspaces
                .append_message(
                    &ws.id,
                    Message::user(format!("m{i}"), Vec::new(), DEFAULT_MODEL, DEFAULT_PROVIDER),
                )
                .await
                .unwrap();
        }

        let chat = prepare(
            &f,
            ChatRequest {
                workspace_id: Some(ws.id.clone()),
                message: "latest".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let messages = &chat.call.request.messages;
        assert_eq!(messages.len(), 21);
        assert_eq!(messages[0].content, "m10");
        assert_eq!(messages[20].content, "latest");
    }

    #[tokio::test]
    async fn test_user_turn_survives_upstream_failure() {
        let f = fixture(ScriptedUpstream {
            fail_with: Some(503),
            ..Default::default()
        });
        let ws = workspace(&f, NewWorkspace::default()).await;

        let chat = prepare(
            &f,
            ChatRequest {
                workspace_id: Some(ws.id.clone()),
                message: "hello".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let err = complete_chat(&f.workspaces, &ChatConfig::default(), chat)
            .await
            .unwrap_err();

        match err {
            GatewayError::UpstreamRejected { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), 500);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let history = f.workspaces.history(&ws.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_completion_records_assistant_with_metadata() {
        let f = fixture(ScriptedUpstream::default());
        let ws = workspace(&f, NewWorkspace::default()).await;

        let chat = prepare(
            &f,
            ChatRequest {
                workspace_id: Some(ws.id.clone()),
                message: "ping".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let reply = complete_chat(&f.workspaces, &ChatConfig::default(), chat)
            .await
            .unwrap();

        assert_eq!(reply.response, "pong");
        assert_eq!(reply.metadata.route, "rainymodel");
        assert_eq!(reply.metadata.upstream, "ollama");
        assert_eq!(reply.metadata.model_actual, "llama3.1:8b");
        assert_eq!(reply.metadata.fallback_reason, "");
        assert_eq!(reply.metadata.decision_chain.len(), 4);
        assert_eq!(reply.metadata.usage["total_tokens"], 3);

        let history = f.workspaces.history(&ws.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "pong");
        assert_eq!(history[1].actual_model.as_deref(), Some("llama3.1:8b"));
    }

    #[tokio::test]
    async fn test_foreign_workspace_is_forbidden() {
        let f = fixture(ScriptedUpstream::default());
        let stranger = User {
            subject_id: "someone-else".into(),
            name: "Else".into(),
            email: None,
            role: None,
        };
        let ws = Workspace::create("w".into(), NewWorkspace::default(), &stranger, Utc::now());
        f.workspaces.put(ws).await.unwrap();

        let result = prepare(
            &f,
            ChatRequest {
                workspace_id: Some("w".into()),
                message: "hi".into(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(GatewayError::Forbidden(_))));

        let missing = prepare(
            &f,
            ChatRequest {
                workspace_id: Some("nope".into()),
                message: "hi".into(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(missing, Err(GatewayError::NotFound(_))));
    }

    #[test]
    fn test_attachment_annotation_lists_documents_only() {
        let doc = UploadedFile {
            id: Uuid::new_v4(),
            name: "plan.pdf".into(),
            kind: FileKind::Document,
            extension: ".pdf".into(),
            size: 1,
            content_type: "application/pdf".into(),
            uploaded_by: "u".into(),
            workspace_id: None,
            uploaded_at: Utc::now(),
            data: Bytes::new(),
        };
        let image = UploadedFile {
            name: "cat.png".into(),
            kind: FileKind::Image,
            extension: ".png".into(),
            ..doc.clone()
        };

        assert_eq!(annotate_attachments("look", &[image.clone()]), "look");
        assert_eq!(
            annotate_attachments("look", &[image, doc]),
            "look\n\n--- Attached Files ---\n[Attached file: plan.pdf (.pdf)]\n"
        );
    }

    async fn stream_events(
        upstream: ScriptedUpstream,
        limits: ChatConfig,
    ) -> (Vec<RelayEvent>, Vec<Message>) {
        let f = fixture(upstream);
        let ws = workspace(&f, NewWorkspace::default()).await;
        let chat = prepare(
            &f,
            ChatRequest {
                workspace_id: Some(ws.id.clone()),
                message: "hi".into(),
                stream: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let store: Arc<dyn WorkspaceStore> = Arc::new(f.workspaces);
        let events: Vec<RelayEvent> = relay_stream(store.clone(), limits, chat).collect().await;
        let history = store.history(&ws.id).await.unwrap();
        (events, history)
    }

    #[tokio::test]
    async fn test_stream_relays_events_then_metadata() {
        let (events, history) = stream_events(
            ScriptedUpstream {
                chunks: vec![
                    "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: not json\n",
                    "\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}],\"usage\":{\"total_tokens\":5}}\n\n",
                    "data: [DONE]\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
                ],
                ..Default::default()
            },
            ChatConfig::default(),
        )
        .await;

        assert_eq!(events.len(), 4);
        assert!(matches!(
            &events[0],
            RelayEvent::Chunk(p) if p == "{\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}"
        ));
        assert!(matches!(&events[1], RelayEvent::Chunk(_)));
        match &events[2] {
            RelayEvent::Metadata(meta) => {
                assert_eq!(meta.usage["total_tokens"], 5);
                assert_eq!(meta.decision_chain.len(), 4);
            }
            other => panic!("expected metadata, got {other:?}"),
        }
        assert!(matches!(events[3], RelayEvent::Done));

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_stream_broken_mid_reply_emits_one_error() {
        let (events, history) = stream_events(
            ScriptedUpstream {
                chunks: vec!["data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n"],
                end: StreamEnd::Break("connection reset"),
                ..Default::default()
            },
            ChatConfig::default(),
        )
        .await;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], RelayEvent::Chunk(_)));
        match &events[1] {
            RelayEvent::Error(body) => {
                assert_eq!(body["error"], "connection reset");
                assert_eq!(body["provider"], "rainymodel");
                assert_eq!(body["model"], DEFAULT_MODEL);
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(matches!(events[2], RelayEvent::Metadata(_)));
        assert!(matches!(events[3], RelayEvent::Done));

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Par");
    }

    #[tokio::test]
    async fn test_stream_idle_timeout_emits_timeout_error() {
        let (events, history) = stream_events(
            ScriptedUpstream {
                chunks: vec!["data: {\"choices\":[{\"delta\":{\"content\":\"Wait\"}}]}\n\n"],
                end: StreamEnd::Stall,
                ..Default::default()
            },
            ChatConfig {
                request_timeout_secs: 0,
                ..ChatConfig::default()
            },
        )
        .await;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], RelayEvent::Chunk(_)));
        match &events[1] {
            RelayEvent::Error(body) => {
                assert_eq!(body["error"], "Request timed out");
                assert_eq!(body["provider"], "rainymodel");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(matches!(events[2], RelayEvent::Metadata(_)));
        assert!(matches!(events[3], RelayEvent::Done));
        assert_eq!(history[1].content, "Wait");
    }
}
