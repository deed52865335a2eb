use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::config::{MAX_TOKENS_MAX, MAX_TOKENS_MIN, TEMPERATURE_MAX};
use crate::model::Model;
use crate::persona::Persona;
use crate::session::{PromptSource, TYPING_MARKER};
use crate::state::ChatRole;

const SIDEBAR_WIDTH: u16 = 38;

/// Style one line of a reply: `**bold**` and `` `code` `` spans. Unclosed
/// markers are kept as literal text.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let bold = rest.find("**");
        let code = rest.find('`');

        let (start, marker, style) = match (bold, code) {
            (Some(b), Some(c)) if c < b => (c, "`", Style::default().fg(Color::Green)),
            (Some(b), _) => (b, "**", Style::default().add_modifier(Modifier::BOLD)),
            (None, Some(c)) => (c, "`", Style::default().fg(Color::Green)),
            (None, None) => break,
        };

        let after = &rest[start + marker.len()..];
        match after.find(marker) {
            Some(end) if end > 0 => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(after[..end].to_string(), style));
                rest = &after[end + marker.len()..];
            }
            _ => {
                // No closing marker: emit up to and including the opener literally
                spans.push(Span::raw(rest[..start + marker.len()].to_string()));
                rest = after;
            }
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [sidebar_area, main_area] = Layout::horizontal([
        Constraint::Length(SIDEBAR_WIDTH.min(body_area.width / 2)),
        Constraint::Min(0),
    ])
    .areas(body_area);

    render_header(app, frame, header_area);
    render_sidebar(app, frame, sidebar_area);
    render_chat(app, frame, main_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.show_persona_picker {
        render_persona_picker(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    } else if app.input_mode == InputMode::EditingPrompt {
        render_prompt_editor(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = match app.session.prompt() {
        PromptSource::Persona(persona) => format!(" {} {} Chat Assistant ", persona.icon(), persona.label()),
        PromptSource::Custom(_) => " ✎ Custom Chat Assistant ".to_string(),
    };

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_sidebar(app: &App, frame: &mut Frame, area: Rect) {
    let persona_height = Persona::all().len() as u16 + 2;
    let [persona_area, about_area, settings_area, stats_area, _rest] = Layout::vertical([
        Constraint::Length(persona_height),
        Constraint::Length(6),
        Constraint::Length(5),
        Constraint::Length(4),
        Constraint::Min(0),
    ])
    .areas(area);

    // Persona radio list
    let active = app.session.persona();
    let items: Vec<ListItem> = Persona::all()
        .into_iter()
        .map(|persona| {
            let selected = Some(persona) == active;
            let radio = if selected { "(•)" } else { "( )" };
            let style = if selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} {} {}", radio, persona.icon(), persona.label())).style(style)
        })
        .collect();
    let personas = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Expert (p) "),
    );
    frame.render_widget(personas, persona_area);

    // About the active persona, or the custom prompt
    let about = match app.session.prompt() {
        PromptSource::Persona(persona) => Text::from(vec![
            Line::from(Span::styled(persona.display_name(), Style::default().bold())),
            Line::from(Span::styled(persona.description(), Style::default().fg(Color::Gray))),
        ]),
        PromptSource::Custom(prompt) => Text::from(vec![
            Line::from(Span::styled("Custom system prompt", Style::default().bold())),
            Line::from(Span::styled(prompt.clone(), Style::default().fg(Color::Gray))),
        ]),
    };
    let about = Paragraph::new(about)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" About (e: edit prompt) "),
        );
    frame.render_widget(about, about_area);

    // Model parameters
    let params = app.params();
    let label = Style::default().fg(Color::DarkGray);
    let settings = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Model       ", label),
            Span::raw(params.model.as_str()),
        ]),
        Line::from(vec![
            Span::styled("Temperature ", label),
            Span::raw(format!("{:.1} ", params.temperature)),
            Span::styled(gauge(params.temperature / TEMPERATURE_MAX), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::styled("Max tokens  ", label),
            Span::raw(format!("{:<5}", params.max_tokens)),
            Span::styled(
                gauge((params.max_tokens - MAX_TOKENS_MIN) as f32 / (MAX_TOKENS_MAX - MAX_TOKENS_MIN) as f32),
                Style::default().fg(Color::Cyan),
            ),
        ]),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Settings (m, t/T, [/]) "),
    );
    frame.render_widget(settings, settings_area);

    // Statistics
    let conversation = app.session.conversation();
    let stats = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Exchanges   ", label),
            Span::raw(conversation.exchange_count().to_string()),
        ]),
        Line::from(vec![
            Span::styled("Tokens (≈)  ", label),
            Span::raw(conversation.token_estimate().to_string()),
        ]),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Stats "),
    );
    frame.render_widget(stats, stats_area);
}

/// Ten-cell bar for a fraction in [0, 1]
fn gauge(fraction: f32) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * 10.0).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, notice_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let assistant_label = match app.session.persona() {
        Some(persona) => format!("{} AI:", persona.icon()),
        None => "AI:".to_string(),
    };

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", app.params().model.display_name()));

    let messages = app.session.conversation().messages();
    let chat_text = if messages.is_empty() && !app.session.is_streaming() {
        Text::from(Span::styled(
            "Type a message to start the conversation...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in messages {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                ChatRole::Assistant | ChatRole::System => {
                    lines.push(Line::from(Span::styled(
                        assistant_label.clone(),
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        if let Some(text) = app.session.display_text() {
            lines.push(Line::from(Span::styled(
                assistant_label.clone(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            if text == TYPING_MARKER {
                // Nothing received yet: animated ellipsis cycles through ".", "..", "..."
                let dots = ".".repeat((app.animation_frame as usize) + 1);
                lines.push(Line::from(Span::styled(
                    format!("Thinking{}", dots),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            } else {
                for line in text.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    // Error from the last reply takes precedence over general notices
    let notice = if let Some(error) = app.session.last_error() {
        Span::styled(format!(" {} ", error), Style::default().fg(Color::Red))
    } else if let Some(notice) = &app.notice {
        Span::styled(format!(" {} ", notice), Style::default().fg(Color::Green))
    } else {
        Span::raw("")
    };
    frame.render_widget(Paragraph::new(Line::from(notice)), notice_area);

    // Input box - highlight when editing
    let editing = app.input_mode == InputMode::Editing;
    let input_border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let input_title = if app.session.is_streaming() {
        " Waiting for reply... "
    } else {
        " Message (i to type, Enter to send) "
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(input_title);

    let (visible_text, cursor_x) = visible_slice(&app.input, app.input_cursor, input_area.width.saturating_sub(2));
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, input_area);

    // Show cursor when editing
    if editing {
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

/// The part of a single-line input that fits in `width` cells, scrolled so
/// the cursor stays visible, plus the cursor column within it.
fn visible_slice(text: &str, cursor: usize, width: u16) -> (String, u16) {
    let inner_width = width as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    let visible: String = text.chars().skip(scroll_offset).take(inner_width).collect();
    (visible, (cursor - scroll_offset) as u16)
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing | InputMode::EditingPrompt => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " TYPE ",
        InputMode::EditingPrompt => " PROMPT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let keys: &[(&str, &str)] = if app.show_persona_picker || app.show_model_picker {
        &[(" j/k ", " nav "), (" Enter ", " select "), (" Esc ", " cancel ")]
    } else {
        match app.input_mode {
            InputMode::Normal => &[
                (" i ", " type "),
                (" p ", " expert "),
                (" m ", " model "),
                (" c ", " clear "),
                (" s ", " save "),
                (" j/k ", " scroll "),
                (" q ", " quit "),
            ],
            InputMode::Editing => &[(" Enter ", " send "), (" Esc ", " stop typing ")],
            InputMode::EditingPrompt => &[(" Enter ", " apply "), (" Esc ", " cancel ")],
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    for (key, label) in keys {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Centered popup area of the given size, clamped to the screen
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn picker_list<'a>(items: Vec<ListItem<'a>>, title: &'a str) -> List<'a> {
    List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ")
}

fn render_persona_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let personas = Persona::all();
    let popup = popup_area(area, 60, personas.len() as u16 + 2);
    frame.render_widget(Clear, popup);

    let active = app.session.persona();
    let items: Vec<ListItem> = personas
        .iter()
        .map(|persona| {
            let style = if Some(*persona) == active {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(
                " {} {:<20} {}",
                persona.icon(),
                persona.label(),
                persona.description()
            ))
            .style(style)
        })
        .collect();

    let list = picker_list(items, " Select Expert (switching clears the chat) ");
    frame.render_stateful_widget(list, popup, &mut app.persona_picker_state);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let models = Model::all();
    let popup = popup_area(area, 40, models.len() as u16 + 2);
    frame.render_widget(Clear, popup);

    let current = app.params().model;
    let items: Vec<ListItem> = models
        .iter()
        .map(|model| {
            let style = if *model == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model.display_name())).style(style)
        })
        .collect();

    let list = picker_list(items, " Select Model ");
    frame.render_stateful_widget(list, popup, &mut app.model_picker_state);
}

fn render_prompt_editor(app: &App, frame: &mut Frame, area: Rect) {
    let popup = popup_area(area, 70, 7);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" System Prompt ");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let instructions = Paragraph::new("Enter to use this prompt, Esc to cancel. Leaving expert mode clears the chat.")
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 2));

    let input_area = Rect::new(inner.x, inner.y + 3, inner.width, 1);
    let (visible_text, cursor_x) = visible_slice(&app.prompt_input, app.prompt_cursor, input_area.width);
    frame.render_widget(
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}
