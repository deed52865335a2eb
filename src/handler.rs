use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(event) => app.on_stream_event(event),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_persona_picker {
        handle_persona_picker(app, key);
        return;
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
        InputMode::EditingPrompt => handle_prompt_editing(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Compose
        KeyCode::Char('i') | KeyCode::Enter => app.start_editing(),
        KeyCode::Char('e') => app.start_prompt_editing(),

        // Sidebar controls
        KeyCode::Char('p') => app.open_persona_picker(),
        KeyCode::Char('m') => app.open_model_picker(),
        KeyCode::Char('t') => app.lower_temperature(),
        KeyCode::Char('T') => app.raise_temperature(),
        KeyCode::Char('[') => app.lower_max_tokens(),
        KeyCode::Char(']') => app.raise_max_tokens(),
        KeyCode::Char('c') => app.clear_history(),
        KeyCode::Char('s') => app.save_history(),

        // Transcript
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('G') | KeyCode::End => {
            app.follow_output = true;
            app.scroll_chat_to_bottom();
        }

        KeyCode::Esc => {
            app.notice = None;
            app.session.dismiss_error();
        }
        _ => {}
    }
}

fn handle_persona_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_persona_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.persona_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.persona_picker_nav_up(),
        KeyCode::Enter => app.confirm_persona(),
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.confirm_model(),
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.stop_editing(),
        KeyCode::Enter => {
            if !app.session.is_streaming() {
                app.send_message();
            }
        }
        _ => edit_line(&mut app.input, &mut app.input_cursor, key.code),
    }
}

fn handle_prompt_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.prompt_input.clear();
            app.prompt_cursor = 0;
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.apply_custom_prompt(),
        _ => edit_line(&mut app.prompt_input, &mut app.prompt_cursor, key.code),
    }
}

/// Single-line editing shared by the chat input and the prompt editor.
/// `cursor` counts characters, not bytes.
fn edit_line(text: &mut String, cursor: &mut usize, code: KeyCode) {
    match code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = text.chars().count();
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            *cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = text.chars().count();
            *cursor = (*cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            *cursor = 0;
        }
        KeyCode::End => {
            *cursor = text.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_keys(codes: &[KeyCode]) -> (String, usize) {
        let mut text = String::new();
        let mut cursor = 0;
        for code in codes {
            edit_line(&mut text, &mut cursor, *code);
        }
        (text, cursor)
    }

    #[test]
    fn test_edit_line_handles_multibyte() {
        let (text, cursor) = type_keys(&[
            KeyCode::Char('こ'),
            KeyCode::Char('ん'),
            KeyCode::Left,
            KeyCode::Char('x'),
            KeyCode::End,
            KeyCode::Backspace,
        ]);
        assert_eq!(text, "こx");
        assert_eq!(cursor, 2);
    }

    #[test]
    fn test_edit_line_delete_and_home() {
        let (text, cursor) = type_keys(&[
            KeyCode::Char('a'),
            KeyCode::Char('b'),
            KeyCode::Home,
            KeyCode::Delete,
            KeyCode::Right,
            KeyCode::Right,
        ]);
        assert_eq!(text, "b");
        assert_eq!(cursor, 1);
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("abc", 10), 3);
    }
}
