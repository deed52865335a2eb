//! Session controller: owns one conversation and drives it through
//! `Idle -> AwaitingInput -> Streaming -> Idle`.
//!
//! The controller itself is synchronous. Fragments are fed in one at a time
//! (by [`ChatSession::run_exchange`] or by a rendering loop consuming
//! [`StreamEvent`]s), so the transcript only ever changes on the caller's
//! thread.

use chrono::NaiveDateTime;
use futures_util::StreamExt;

use crate::ai::{CompletionClient, CompletionError, CompletionRequest, FragmentStream};
use crate::config::ModelParams;
use crate::conversation::{estimate_tokens, Conversation};
use crate::export::ChatExport;
use crate::persona::Persona;
use crate::state::ChatMessage;

/// Committed in place of a reply whose stream failed.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// Appended to the in-progress reply while fragments are still arriving.
pub const TYPING_MARKER: &str = "▌";

pub const DEFAULT_CUSTOM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a reply is still being generated")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    AwaitingInput,
    Streaming,
}

/// Where the system prompt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// One of the fixed expert personas
    Persona(Persona),
    /// A free-text prompt typed by the user
    Custom(String),
}

impl Default for PromptSource {
    fn default() -> Self {
        PromptSource::Persona(Persona::default())
    }
}

impl PromptSource {
    pub fn system_prompt(&self) -> &str {
        match self {
            PromptSource::Persona(persona) => persona.system_prompt(),
            PromptSource::Custom(text) => text,
        }
    }

    pub fn persona(&self) -> Option<Persona> {
        match self {
            PromptSource::Persona(persona) => Some(*persona),
            PromptSource::Custom(_) => None,
        }
    }
}

/// Progress of a reply, as forwarded from a stream to the rendering loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Finished,
    Failed(CompletionError),
}

#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    conversation: Conversation,
    prompt: PromptSource,
    params: ModelParams,
    phase: SessionPhase,
    pending_user: Option<String>,
    reply_buffer: String,
    last_error: Option<String>,
}

impl ChatSession {
    pub fn new(prompt: PromptSource, params: ModelParams) -> Self {
        Self {
            prompt,
            params,
            ..Self::default()
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    pub fn prompt(&self) -> &PromptSource {
        &self.prompt
    }

    pub fn persona(&self) -> Option<Persona> {
        self.prompt.persona()
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Take a fresh configuration snapshot; applies from the next request on.
    pub fn set_params(&mut self, params: ModelParams) {
        self.params = params;
    }

    /// Short message describing the most recent failed reply
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// The reply so far plus the typing marker, while a reply is streaming.
    pub fn display_text(&self) -> Option<String> {
        self.is_streaming()
            .then(|| format!("{}{}", self.reply_buffer, TYPING_MARKER))
    }

    pub fn begin_input(&mut self) {
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::AwaitingInput;
        }
    }

    pub fn cancel_input(&mut self) {
        if self.phase == SessionPhase::AwaitingInput {
            self.phase = SessionPhase::Idle;
        }
    }

    /// Accept a user message and start a reply.
    ///
    /// The message is committed to the transcript before any network
    /// activity. The returned request carries the history as it was before
    /// this message.
    pub fn submit(&mut self, text: &str) -> Result<CompletionRequest, SessionError> {
        if self.is_streaming() {
            return Err(SessionError::Busy);
        }

        let history = self.conversation.messages().to_vec();
        self.conversation.append(ChatMessage::user(text))?;

        self.phase = SessionPhase::Streaming;
        self.pending_user = Some(text.to_string());
        self.reply_buffer.clear();

        Ok(CompletionRequest {
            system_prompt: self.prompt.system_prompt().to_string(),
            history,
            user_message: text.to_string(),
            params: self.params,
        })
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        if self.is_streaming() {
            self.reply_buffer.push_str(fragment);
        }
    }

    /// Commit the streamed reply and count the exchange towards the token
    /// estimate. Returns `None` when no reply was streaming.
    pub fn complete(&mut self) -> Option<&ChatMessage> {
        if !self.is_streaming() {
            return None;
        }

        let reply = std::mem::take(&mut self.reply_buffer);
        let user = self.pending_user.take().unwrap_or_default();
        self.conversation
            .add_tokens(estimate_tokens(&user) + estimate_tokens(&reply));
        self.commit_reply(reply);
        self.last_error = None;
        self.conversation.last()
    }

    /// Discard whatever was streamed and commit the fixed apology instead.
    /// The token estimate is left untouched.
    pub fn fail(&mut self, error: &CompletionError) -> Option<&ChatMessage> {
        if !self.is_streaming() {
            return None;
        }

        tracing::warn!(%error, discarded = self.reply_buffer.len(), "reply failed");
        self.reply_buffer.clear();
        self.pending_user = None;
        self.commit_reply(APOLOGY.to_string());
        self.last_error = Some(format!("Error: {}", error));
        self.conversation.last()
    }

    fn commit_reply(&mut self, reply: String) {
        // Only user messages can be rejected by the store
        let _ = self.conversation.append(ChatMessage::assistant(reply));
        self.phase = SessionPhase::Idle;
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Fragment(fragment) => self.push_fragment(&fragment),
            StreamEvent::Finished => {
                self.complete();
            }
            StreamEvent::Failed(error) => {
                self.fail(&error);
            }
        }
    }

    /// Run one full exchange: submit, pull fragments until the stream ends,
    /// then commit. Stream failures are absorbed here; only a rejected
    /// submission is returned as an error.
    pub async fn run_exchange<F>(
        &mut self,
        client: &dyn CompletionClient,
        text: &str,
        mut on_update: F,
    ) -> Result<(), SessionError>
    where
        F: FnMut(&str),
    {
        let request = self.submit(text)?;

        match client.stream(request).await {
            Ok(mut stream) => loop {
                match stream.next().await {
                    Some(Ok(fragment)) => {
                        self.push_fragment(&fragment);
                        if let Some(text) = self.display_text() {
                            on_update(&text);
                        }
                    }
                    Some(Err(error)) => {
                        self.fail(&error);
                        break;
                    }
                    None => {
                        self.complete();
                        break;
                    }
                }
            },
            Err(error) => {
                self.fail(&error);
            }
        }

        if let Some(reply) = self.conversation.last() {
            on_update(&reply.content);
        }
        Ok(())
    }

    /// Change persona. A different persona discards the transcript and the
    /// token estimate so nothing from the old persona leaks into the new
    /// conversation. Returns whether anything changed.
    pub fn switch_persona(&mut self, persona: Persona) -> Result<bool, SessionError> {
        if self.is_streaming() {
            return Err(SessionError::Busy);
        }
        if self.prompt.persona() == Some(persona) {
            return Ok(false);
        }

        tracing::info!(persona = persona.key(), "switching persona");
        self.prompt = PromptSource::Persona(persona);
        self.reset();
        Ok(true)
    }

    /// Use a free-text system prompt. Leaving persona mode starts a fresh
    /// conversation; editing an existing custom prompt keeps the transcript.
    pub fn set_custom_prompt(&mut self, text: &str) -> Result<(), SessionError> {
        if self.is_streaming() {
            return Err(SessionError::Busy);
        }
        let leaving_persona = self.prompt.persona().is_some();
        self.prompt = PromptSource::Custom(text.to_string());
        if leaving_persona {
            self.reset();
        }
        Ok(())
    }

    /// Drop the transcript and token estimate.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        if self.is_streaming() {
            return Err(SessionError::Busy);
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.conversation.clear();
        self.reply_buffer.clear();
        self.pending_user = None;
        self.last_error = None;
    }

    /// Snapshot for saving, or `None` when there is nothing to save.
    pub fn export(&self, now: NaiveDateTime) -> Option<ChatExport> {
        ChatExport::new(self.conversation.messages(), self.params.model.as_str(), now)
    }
}

/// Forward a reply stream to `sink` until it ends. Stops early if the sink
/// reports the receiver is gone.
pub async fn pump_stream<S>(mut stream: FragmentStream, mut sink: S)
where
    S: FnMut(StreamEvent) -> bool,
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                if !sink(StreamEvent::Fragment(fragment)) {
                    return;
                }
            }
            Err(error) => {
                sink(StreamEvent::Failed(error));
                return;
            }
        }
    }
    sink(StreamEvent::Finished);
}

/// Open a stream for `request` and pump it to `sink`. Opening errors are
/// reported as [`StreamEvent::Failed`].
pub async fn drive_request<S>(client: &dyn CompletionClient, request: CompletionRequest, mut sink: S)
where
    S: FnMut(StreamEvent) -> bool,
{
    match client.stream(request).await {
        Ok(stream) => pump_stream(stream, sink).await,
        Err(error) => {
            sink(StreamEvent::Failed(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::state::ChatRole;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Script = Result<Vec<Result<String, CompletionError>>, CompletionError>;

    /// Replays one scripted reply per call and records the requests it saw.
    #[derive(Default)]
    struct ScriptedClient {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn replying(replies: &[&[&str]]) -> Self {
            let client = Self::default();
            for reply in replies {
                client.push(Ok(reply.iter().map(|f| Ok(f.to_string())).collect()));
            }
            client
        }

        fn push(&self, script: Script) {
            self.scripts.lock().unwrap().push_back(script);
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, CompletionError> {
            self.requests.lock().unwrap().push(request);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()));
            let items = script?;
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn transport_error() -> CompletionError {
        CompletionError::Transport("connection reset".to_string())
    }

    fn session() -> ChatSession {
        ChatSession::new(PromptSource::Persona(Persona::General), ModelParams::default())
    }

    #[tokio::test]
    async fn test_successful_exchanges_append_in_order() {
        let client = ScriptedClient::replying(&[&["one"], &["two"], &["thr", "ee"]]);
        let mut session = session();

        for input in ["a", "b", "c"] {
            session.run_exchange(&client, input, |_| {}).await.unwrap();
        }

        let transcript: Vec<(ChatRole, &str)> = session
            .conversation()
            .messages()
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            transcript,
            vec![
                (ChatRole::User, "a"),
                (ChatRole::Assistant, "one"),
                (ChatRole::User, "b"),
                (ChatRole::Assistant, "two"),
                (ChatRole::User, "c"),
                (ChatRole::Assistant, "three"),
            ]
        );
        assert_eq!(session.conversation().exchange_count(), 3);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_token_estimate_counts_both_sides() {
        let client = ScriptedClient::replying(&[&["hi ", "there ", "friend"]]);
        let mut session = session();
        session.conversation.add_tokens(10);

        session.run_exchange(&client, "hello world", |_| {}).await.unwrap();
        assert_eq!(session.conversation().token_estimate(), 15);
    }

    #[tokio::test]
    async fn test_partial_reply_replaced_by_apology() {
        let client = ScriptedClient::default();
        client.push(Ok(vec![
            Ok("Hel".to_string()),
            Ok("lo ".to_string()),
            Err(transport_error()),
        ]));
        let mut session = session();

        let mut updates = Vec::new();
        session
            .run_exchange(&client, "hello world", |text| updates.push(text.to_string()))
            .await
            .unwrap();

        let last = session.conversation().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, APOLOGY);
        assert_eq!(session.conversation().token_estimate(), 0);
        assert_eq!(session.last_error(), Some("Error: connection failed: connection reset"));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(updates, vec!["Hel▌", "Hello ▌", APOLOGY]);
    }

    #[tokio::test]
    async fn test_open_failure_recovers() {
        let client = ScriptedClient::default();
        client.push(Err(CompletionError::Api { status: 401, message: "bad key".to_string() }));
        client.push(Ok(vec![Ok("fine".to_string())]));
        let mut session = session();

        session.run_exchange(&client, "first", |_| {}).await.unwrap();
        assert_eq!(session.conversation().last().unwrap().content, APOLOGY);

        session.run_exchange(&client, "second", |_| {}).await.unwrap();
        assert_eq!(session.conversation().last().unwrap().content, "fine");
        assert_eq!(session.last_error(), None);
        assert_eq!(session.conversation().len(), 4);
        assert_eq!(session.conversation().token_estimate(), 2);
    }

    #[tokio::test]
    async fn test_request_carries_prompt_history_and_params() {
        let client = ScriptedClient::replying(&[&["hello"], &["ok"]]);
        let params = ModelParams::new(Model::Gpt4o, 1.5, 2000);
        let mut session = ChatSession::new(PromptSource::Persona(Persona::Chef), params);

        session.run_exchange(&client, "hi", |_| {}).await.unwrap();
        session.run_exchange(&client, "recipe?", |_| {}).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].history, Vec::<ChatMessage>::new());
        assert_eq!(requests[1].system_prompt, Persona::Chef.system_prompt());
        assert_eq!(
            requests[1].history,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
        assert_eq!(requests[1].user_message, "recipe?");
        assert_eq!(requests[1].params, params);
    }

    #[test]
    fn test_user_message_committed_before_reply() {
        let mut session = session();
        session.begin_input();
        assert_eq!(session.phase(), SessionPhase::AwaitingInput);

        session.submit("question").unwrap();
        assert_eq!(session.phase(), SessionPhase::Streaming);
        assert_eq!(session.conversation().messages(), &[ChatMessage::user("question")]);

        session.push_fragment("ans");
        assert_eq!(session.display_text().as_deref(), Some("ans▌"));
        // Buffer is not part of the transcript until committed
        assert_eq!(session.conversation().len(), 1);

        let reply = session.complete().unwrap();
        assert_eq!(reply, &ChatMessage::assistant("ans"));
        assert_eq!(session.display_text(), None);
    }

    #[test]
    fn test_submit_rejections() {
        let mut session = session();
        assert_eq!(session.submit("  \n"), Err(SessionError::EmptyMessage));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.conversation().is_empty());

        session.submit("first").unwrap();
        assert_eq!(session.submit("second"), Err(SessionError::Busy));
        assert_eq!(session.clear(), Err(SessionError::Busy));
        assert_eq!(session.switch_persona(Persona::Writer), Err(SessionError::Busy));
        assert_eq!(session.conversation().len(), 1);
    }

    #[test]
    fn test_events_outside_streaming_are_ignored() {
        let mut session = session();
        session.apply(StreamEvent::Fragment("stray".to_string()));
        session.apply(StreamEvent::Finished);
        session.apply(StreamEvent::Failed(transport_error()));
        assert!(session.conversation().is_empty());
        assert_eq!(session.last_error(), None);
    }

    #[tokio::test]
    async fn test_persona_switch_resets_everything() {
        let client = ScriptedClient::replying(&[&["a reply"]]);
        let mut session = session();
        session.run_exchange(&client, "some words here", |_| {}).await.unwrap();
        assert!(session.conversation().token_estimate() > 0);

        assert_eq!(session.switch_persona(Persona::Programmer), Ok(true));
        assert!(session.conversation().is_empty());
        assert_eq!(session.conversation().token_estimate(), 0);
        assert_eq!(session.prompt().system_prompt(), Persona::Programmer.system_prompt());
    }

    #[test]
    fn test_same_persona_is_noop() {
        let mut session = session();
        session.submit("keep me").unwrap();
        session.complete();

        assert_eq!(session.switch_persona(Persona::General), Ok(false));
        assert_eq!(session.conversation().len(), 2);
    }

    #[test]
    fn test_clear_twice_matches_clear_once() {
        let mut session = session();
        session.submit("one two").unwrap();
        session.push_fragment("three");
        session.complete();

        session.clear().unwrap();
        let once = (session.conversation().len(), session.conversation().token_estimate(), session.phase());
        session.clear().unwrap();
        let twice = (session.conversation().len(), session.conversation().token_estimate(), session.phase());

        assert_eq!(once, (0, 0, SessionPhase::Idle));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_custom_prompt_modes() {
        let mut session = session();
        session.submit("hi").unwrap();
        session.complete();

        // Leaving persona mode starts over
        session.set_custom_prompt("Talk like a pirate.").unwrap();
        assert!(session.conversation().is_empty());
        assert_eq!(session.persona(), None);

        session.submit("ahoy").unwrap();
        session.complete();

        // Editing the custom prompt keeps the transcript
        session.set_custom_prompt("Talk like a poet.").unwrap();
        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.prompt().system_prompt(), "Talk like a poet.");

        // Coming back to a persona starts over again
        assert_eq!(session.switch_persona(Persona::General), Ok(true));
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn test_export_uses_current_model() {
        let mut session = session();
        let now = chrono::NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert!(session.export(now).is_none());

        session.submit("hi").unwrap();
        session.push_fragment("hello");
        session.complete();

        let export = session.export(now).unwrap();
        assert_eq!(export.model, "gpt-4o-mini");
        assert_eq!(
            export.messages,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
        assert_eq!(export.file_name(), "chat_history_20250102_030405.json");
    }

    #[tokio::test]
    async fn test_pump_stream_forwards_until_failure() {
        let items = vec![
            Ok("a".to_string()),
            Err(transport_error()),
            Ok("never".to_string()),
        ];
        let mut events = Vec::new();
        pump_stream(Box::pin(stream::iter(items)), |event| {
            events.push(event);
            true
        })
        .await;

        assert_eq!(
            events,
            vec![StreamEvent::Fragment("a".to_string()), StreamEvent::Failed(transport_error())]
        );
    }

    #[tokio::test]
    async fn test_drive_request_feeds_session() {
        let client = ScriptedClient::replying(&[&["x", "y"]]);
        let mut session = session();
        let request = session.submit("go").unwrap();

        let mut events = Vec::new();
        drive_request(&client, request, |event| {
            events.push(event);
            true
        })
        .await;
        for event in events {
            session.apply(event);
        }

        assert_eq!(session.conversation().last().unwrap().content, "xy");
        assert_eq!(session.conversation().token_estimate(), 2);
    }

    #[tokio::test]
    async fn test_pump_stops_when_receiver_gone() {
        let items = vec![Ok("a".to_string()), Ok("b".to_string())];
        let mut seen = 0;
        pump_stream(Box::pin(stream::iter(items)), |_| {
            seen += 1;
            false
        })
        .await;
        assert_eq!(seen, 1);
    }
}
