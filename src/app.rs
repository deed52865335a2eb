use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;

use crate::ai::CompletionClient;
use crate::config::{Config, ModelParams};
use crate::model::Model;
use crate::persona::Persona;
use crate::session::{drive_request, ChatSession, PromptSource, SessionError, StreamEvent};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing a chat message
    Editing,
    /// Typing a free-text system prompt
    EditingPrompt,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation
    pub session: ChatSession,
    pub client: Arc<dyn CompletionClient>,
    pub events: mpsc::UnboundedSender<AppEvent>,
    pub stream_task: Option<tokio::task::JoinHandle<()>>,

    // Chat input
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars

    // System prompt editor
    pub prompt_input: String,
    pub prompt_cursor: usize,

    // Transcript viewport
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_output: bool,

    // Pickers
    pub show_persona_picker: bool,
    pub persona_picker_state: ListState,
    pub show_model_picker: bool,
    pub model_picker_state: ListState,

    // Animation state
    pub animation_frame: u8,

    /// One-line status shown under the transcript (saved path, refusals)
    pub notice: Option<String>,

    // Preferences
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl App {
    /// `config_path` of `None` keeps preference changes in memory only.
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        prompt: Option<PromptSource>,
        client: Arc<dyn CompletionClient>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let prompt = prompt.unwrap_or_else(|| PromptSource::Persona(config.persona()));
        let session = ChatSession::new(prompt, config.model_params());

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,

            session,
            client,
            events,
            stream_task: None,

            input: String::new(),
            input_cursor: 0,

            prompt_input: String::new(),
            prompt_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_output: true,

            show_persona_picker: false,
            persona_picker_state: ListState::default(),
            show_model_picker: false,
            model_picker_state: ListState::default(),

            animation_frame: 0,

            notice: None,

            config,
            config_path,
        }
    }

    pub fn params(&self) -> ModelParams {
        *self.session.params()
    }

    // Sending

    pub fn start_editing(&mut self) {
        self.session.begin_input();
        self.input_mode = InputMode::Editing;
    }

    pub fn stop_editing(&mut self) {
        self.session.cancel_input();
        self.input_mode = InputMode::Normal;
    }

    /// Submit the input box and stream the reply in the background.
    pub fn send_message(&mut self) {
        let text = self.input.clone();
        let request = match self.session.submit(&text) {
            Ok(request) => request,
            Err(SessionError::EmptyMessage) => return,
            Err(e) => {
                self.notice = Some(e.to_string());
                return;
            }
        };

        self.input.clear();
        self.input_cursor = 0;
        self.input_mode = InputMode::Normal;
        self.notice = None;
        self.follow_output = true;
        self.scroll_chat_to_bottom();

        let client = Arc::clone(&self.client);
        let tx = self.events.clone();
        self.stream_task = Some(tokio::spawn(async move {
            drive_request(client.as_ref(), request, move |event| {
                tx.send(AppEvent::Stream(event)).is_ok()
            })
            .await;
        }));
    }

    pub fn on_stream_event(&mut self, event: StreamEvent) {
        self.session.apply(event);
        if !self.session.is_streaming() {
            self.stream_task = None;
        }
        if self.follow_output {
            self.scroll_chat_to_bottom();
        }
    }

    // Sidebar controls

    pub fn switch_persona(&mut self, persona: Persona) {
        match self.session.switch_persona(persona) {
            Ok(true) => {
                self.chat_scroll = 0;
                self.notice = None;
                self.persist(|config| config.persona = Some(persona.key().to_string()));
            }
            Ok(false) => {}
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    pub fn select_model(&mut self, model: Model) {
        let mut params = self.params();
        params.model = model;
        self.apply_params(params);
    }

    pub fn raise_temperature(&mut self) {
        let mut params = self.params();
        params.raise_temperature();
        self.apply_params(params);
    }

    pub fn lower_temperature(&mut self) {
        let mut params = self.params();
        params.lower_temperature();
        self.apply_params(params);
    }

    pub fn raise_max_tokens(&mut self) {
        let mut params = self.params();
        params.raise_max_tokens();
        self.apply_params(params);
    }

    pub fn lower_max_tokens(&mut self) {
        let mut params = self.params();
        params.lower_max_tokens();
        self.apply_params(params);
    }

    fn apply_params(&mut self, params: ModelParams) {
        if params == self.params() {
            return;
        }
        self.session.set_params(params);
        self.persist(|config| config.remember_params(&params));
    }

    pub fn start_prompt_editing(&mut self) {
        self.prompt_input = self.session.prompt().system_prompt().to_string();
        self.prompt_cursor = self.prompt_input.chars().count();
        self.input_mode = InputMode::EditingPrompt;
    }

    pub fn apply_custom_prompt(&mut self) {
        let text = self.prompt_input.trim().to_string();
        if text.is_empty() {
            self.notice = Some("System prompt is empty".to_string());
            return;
        }
        match self.session.set_custom_prompt(&text) {
            Ok(()) => {
                self.input_mode = InputMode::Normal;
                self.notice = None;
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    pub fn clear_history(&mut self) {
        match self.session.clear() {
            Ok(()) => {
                self.chat_scroll = 0;
                self.notice = None;
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    pub fn save_history(&mut self) {
        self.save_history_at(Local::now().naive_local());
    }

    pub fn save_history_at(&mut self, now: NaiveDateTime) {
        let Some(export) = self.session.export(now) else {
            self.notice = Some("Nothing to save yet".to_string());
            return;
        };

        self.notice = Some(match export.save_to_dir(&self.config.export_dir()) {
            Ok(path) => format!("Saved {}", path.display()),
            Err(e) => {
                tracing::warn!(error = %e, "saving chat history failed");
                format!("Could not save chat history: {}", e)
            }
        });
    }

    fn persist(&mut self, edit: impl FnOnce(&mut Config)) {
        edit(&mut self.config);
        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save_to(path) {
                tracing::warn!(error = %e, "could not save preferences");
            }
        }
    }

    // Pickers

    pub fn open_persona_picker(&mut self) {
        let current = self.session.persona().unwrap_or_default();
        let index = Persona::all().iter().position(|p| *p == current);
        self.persona_picker_state.select(index.or(Some(0)));
        self.show_persona_picker = true;
    }

    pub fn persona_picker_nav_down(&mut self) {
        let len = Persona::all().len();
        let i = self.persona_picker_state.selected().unwrap_or(0);
        self.persona_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn persona_picker_nav_up(&mut self) {
        let i = self.persona_picker_state.selected().unwrap_or(0);
        self.persona_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn confirm_persona(&mut self) {
        if let Some(persona) = self.persona_picker_state.selected().and_then(|i| Persona::all().get(i).copied()) {
            self.switch_persona(persona);
        }
        self.show_persona_picker = false;
    }

    pub fn open_model_picker(&mut self) {
        let current = self.params().model;
        let index = Model::all().iter().position(|m| *m == current);
        self.model_picker_state.select(index.or(Some(0)));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = Model::all().len();
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn confirm_model(&mut self) {
        if let Some(model) = self.model_picker_state.selected().and_then(|i| Model::all().get(i).copied()) {
            self.select_model(model);
        }
        self.show_model_picker = false;
    }

    // Transcript scrolling

    pub fn scroll_up(&mut self) {
        self.follow_output = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        let max = self.max_chat_scroll();
        self.chat_scroll = (self.chat_scroll + 1).min(max);
        self.follow_output = self.chat_scroll >= max;
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.transcript_line_count().saturating_sub(visible_height)
    }

    /// Rendered height of the transcript, counting wrapped lines
    pub fn transcript_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let wrapped = |text: &str| -> u16 {
            text.lines()
                .map(|line| {
                    // Use character count, not byte length, for proper UTF-8 handling
                    let char_count = line.chars().count();
                    ((char_count / wrap_width) + 1) as u16
                })
                .sum::<u16>()
                .max(1)
        };

        let mut total_lines: u16 = 0;
        for msg in self.session.conversation().messages() {
            // Role line, content, blank line after message
            total_lines = total_lines.saturating_add(2 + wrapped(&msg.content));
        }
        if let Some(text) = self.session.display_text() {
            total_lines = total_lines.saturating_add(2 + wrapped(&text));
        }
        total_lines
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_streaming() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}
