use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use persona_chat::app::App;
use persona_chat::config::{resolve_api_key, Config, API_KEY_ENV};
use persona_chat::session::PromptSource;
use persona_chat::{handler, logging, tui, ui, Model, OpenAIClient, Persona};

#[derive(Parser)]
#[command(name = "persona-chat")]
#[command(version, about = "Chat with expert personas backed by a hosted LLM, with streaming replies")]
struct Cli {
    /// Start with this expert (general, programmer, teacher, medical, chef, business, writer)
    #[arg(short, long)]
    persona: Option<String>,
    /// Model to use (gpt-4o-mini, gpt-4o, gpt-3.5-turbo)
    #[arg(short, long)]
    model: Option<String>,
    /// Use a free-text system prompt instead of an expert persona
    #[arg(long, value_name = "TEXT")]
    custom_prompt: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is best effort; the app still runs without a log file
    let _log_guard = logging::init().ok();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = Config::get_config_path()?;
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("Could not read {}", config_path.display()))?;

    if let Some(key) = cli.persona.as_deref() {
        let persona = Persona::from_key(key)
            .with_context(|| format!("Unknown persona '{}'", key))?;
        config.persona = Some(persona.key().to_string());
    }
    if let Some(name) = cli.model.as_deref() {
        let model = Model::from_str(name)
            .with_context(|| format!("Unknown model '{}'", name))?;
        config.model = Some(model.as_str().to_string());
    }

    // Missing credential is fatal: explain how to fix it before touching the terminal
    let api_key = resolve_api_key(std::env::var(API_KEY_ENV).ok(), &config, &config_path)?;
    let client = OpenAIClient::with_base_url(&api_key, &config.base_url());

    let prompt = cli.custom_prompt.map(PromptSource::Custom);

    tracing::info!(
        persona = config.persona().key(),
        model = config.model_params().model.as_str(),
        custom_prompt = prompt.is_some(),
        "starting session"
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let mut app = App::new(config, Some(config_path), prompt, Arc::new(client), events.sender());

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Some(task) = app.stream_task.take() {
        task.abort();
    }
    tui::restore()?;
    tracing::info!(
        exchanges = app.session.conversation().exchange_count(),
        tokens = app.session.conversation().token_estimate(),
        "session ended"
    );
    result
}
