use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Probe => app.start_probe(),
    }
    app.poll_tasks().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_path_input {
        handle_path_input(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        // Half-page scroll (must be before plain 'u' to match first)
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down((app.chat_height / 2).max(1));
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up((app.chat_height / 2).max(1));
        }

        KeyCode::Char('q') => app.should_quit = true,

        // Document
        KeyCode::Char('o') => app.open_path_input(),
        KeyCode::Char('u') => app.start_upload(),

        // New chat
        KeyCode::Char('n') => app.start_new_chat(),

        // Start typing a question
        KeyCode::Char('i') | KeyCode::Tab | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            // Cursor at end of existing text
            app.query_cursor = app.session.question.chars().count();
        }

        // Scroll transcript
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        KeyCode::Esc => app.session.dismiss_error(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if app.session.can_ask() {
                app.submit_question();
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Backspace => {
            if app.query_cursor > 0 {
                app.query_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.session.question, app.query_cursor);
                app.session.question.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.session.question.chars().count();
            if app.query_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.session.question, app.query_cursor);
                app.session.question.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.query_cursor = app.query_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.session.question.chars().count();
            app.query_cursor = (app.query_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.query_cursor = 0;
        }
        KeyCode::End => {
            app.query_cursor = app.session.question.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.session.question, app.query_cursor);
            app.session.question.insert(byte_pos, c);
            app.query_cursor += 1;
        }
        _ => {}
    }
}

fn handle_path_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_path_input(),
        KeyCode::Enter => app.confirm_path_input(),
        KeyCode::Backspace => {
            if app.path_input_cursor > 0 {
                app.path_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.path_input, app.path_input_cursor);
                app.path_input.remove(byte_pos);
            }
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.path_input, app.path_input_cursor);
            app.path_input.insert(byte_pos, c);
            app.path_input_cursor += 1;
        }
        KeyCode::Left => {
            app.path_input_cursor = app.path_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.path_input.chars().count();
            app.path_input_cursor = (app.path_input_cursor + 1).min(char_count);
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
