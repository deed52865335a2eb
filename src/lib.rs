pub mod ai;
pub mod app;
pub mod config;
pub mod conversation;
pub mod export;
pub mod handler;
pub mod logging;
pub mod model;
pub mod persona;
pub mod session;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use ai::{CompletionClient, CompletionError, CompletionRequest, FragmentStream, OpenAIClient};
pub use config::{Config, ModelParams};
pub use conversation::{estimate_tokens, Conversation};
pub use export::ChatExport;
pub use model::Model;
pub use persona::Persona;
pub use session::{ChatSession, PromptSource, SessionError, SessionPhase, StreamEvent};
pub use state::{ChatMessage, ChatRole};
