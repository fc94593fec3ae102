use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::document::format_size;
use crate::session::{ChatRole, Connectivity};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, document_area, chat_area, banner_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_document_bar(app, frame, document_area);
    render_chat(app, frame, chat_area);
    render_banner(app, frame, banner_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.show_path_input {
        render_path_input(app, frame, area);
    }
}

fn status_style(status: Connectivity) -> Style {
    match status {
        Connectivity::Connected => Style::default().fg(Color::Green),
        Connectivity::Connecting => Style::default().fg(Color::Yellow),
        Connectivity::Disconnected => Style::default().fg(Color::Red),
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let status = app.session.status();

    let title = Line::from(vec![
        Span::styled(" HR/IT FAQ Chatbot ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::raw("  "),
        Span::styled("● ", status_style(status)),
        Span::styled(status.label(), status_style(status)),
        Span::styled(format!("  {}", app.backend.base_url()), Style::default().fg(Color::Gray)),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_document_bar(app: &App, frame: &mut Frame, area: Rect) {
    let session = &app.session;

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Document ");

    let line = match session.document() {
        Some(doc) => {
            let mut spans = vec![
                Span::raw(if session.is_uploaded() { "Current file: " } else { "Selected: " }),
                Span::styled(doc.name.clone(), Style::default().fg(Color::Cyan).bold()),
                Span::styled(format!(" ({})", format_size(doc.size)), Style::default().fg(Color::DarkGray)),
                Span::raw("  "),
            ];
            if session.is_uploading() {
                let dots = ".".repeat((app.animation_frame as usize) + 1);
                spans.push(Span::styled(
                    format!("Uploading{}", dots),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
                ));
            } else if session.is_uploaded() {
                spans.push(Span::styled("✓ uploaded", Style::default().fg(Color::Green)));
            } else {
                spans.push(Span::styled("not uploaded (press u)", Style::default().fg(Color::Yellow)));
            }
            Line::from(spans)
        }
        None => Line::from(vec![
            Span::styled("No file chosen", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format!(
                    "  Supported formats: .txt, .pdf, .doc, .docx (Max size: {})",
                    format_size(session.policy().max_upload_bytes)
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    };

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let focused = app.input_mode == InputMode::Normal && !app.show_path_input;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Chat ");

    let session = &app.session;
    let chat_text = if session.messages().is_empty() && !session.is_asking() {
        let hint = if session.is_uploaded() || !session.policy().require_upload {
            "Ask a question about your document..."
        } else {
            "Choose a document with o, then upload it with u."
        };
        Text::from(Span::styled(hint, Style::default().fg(Color::DarkGray)))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in session.messages() {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.clone()));
                }
                ChatRole::Bot => {
                    lines.push(Line::from(Span::styled(
                        "Bot:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        if session.is_asking() {
            lines.push(Line::from(Span::styled(
                "Bot:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_banner(app: &App, frame: &mut Frame, area: Rect) {
    let session = &app.session;

    let line = if let Some(error) = session.error() {
        Line::from(vec![
            Span::styled(" Error: ", Style::default().fg(Color::White).bg(Color::Red).bold()),
            Span::styled(format!(" {}", error), Style::default().fg(Color::Red)),
        ])
    } else if session.is_clearing() {
        Line::from(Span::styled(" Starting a new chat...", Style::default().fg(Color::Yellow)))
    } else if let Some(notice) = session.notice() {
        Line::from(Span::styled(format!(" {}", notice), Style::default().fg(Color::Green)))
    } else {
        Line::default()
    };

    frame.render_widget(Paragraph::new(line), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let session = &app.session;
    let editing = app.input_mode == InputMode::Editing;

    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let title = match session.ask_blocker() {
        Some(reason) => format!(" Ask ({}) ", reason),
        None => " Ask (i to type, Enter to send) ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling keeps the cursor visible; inner width excludes borders
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;
    let scroll_offset = if inner_width == 0 || cursor_pos < inner_width {
        0
    } else {
        cursor_pos - inner_width + 1
    };

    let input = if session.question.is_empty() && !editing {
        Paragraph::new(Span::styled("Ask your question...", Style::default().fg(Color::DarkGray)))
    } else {
        let visible_text: String = session
            .question
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan))
    };

    frame.render_widget(input.block(block), area);

    if editing && !app.show_path_input {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let session = &app.session;

    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" ASK ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let disabled_style = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let hint = |key: &'static str, label: &'static str, enabled: bool| {
        vec![
            Span::styled(key, key_style),
            Span::styled(label, if enabled { label_style } else { disabled_style }),
        ]
    };

    let hints: Vec<Span> = if app.show_path_input {
        [hint(" Enter ", " select ", true), hint(" Esc ", " cancel ", true)].concat()
    } else {
        match app.input_mode {
            InputMode::Normal => [
                hint(" o ", " open file ", !session.is_uploading() && !session.is_clearing()),
                hint(" u ", " upload ", session.can_upload()),
                hint(" i ", " ask ", session.ask_blocker().is_none()),
                hint(" n ", " new chat ", !session.is_clearing() && !session.is_uploading()),
                hint(" j/k ", " scroll ", true),
                hint(" q ", " quit ", true),
            ]
            .concat(),
            InputMode::Editing => [
                hint(" Enter ", " send ", session.can_ask()),
                hint(" Esc ", " stop typing ", true),
            ]
            .concat(),
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_path_input(app: &App, frame: &mut Frame, area: Rect) {
    let [popup_area] = Layout::vertical([Constraint::Length(5)]).flex(Flex::Center).areas(area);
    let [popup_area] = Layout::horizontal([Constraint::Percentage(70)]).flex(Flex::Center).areas(popup_area);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Open document (.txt, .pdf, .doc, .docx) ");

    let inner_width = popup_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.path_input_cursor;
    let scroll_offset = if inner_width == 0 || cursor_pos < inner_width {
        0
    } else {
        cursor_pos - inner_width + 1
    };
    let visible: String = app.path_input.chars().skip(scroll_offset).take(inner_width).collect();

    let mut lines = vec![Line::from(Span::styled(visible, Style::default().fg(Color::Cyan)))];
    if let Some(error) = app.session.error() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(error.to_string(), Style::default().fg(Color::Red))));
    }

    frame.render_widget(Paragraph::new(lines).block(block), popup_area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((popup_area.x + cursor_x + 1, popup_area.y + 1));
}
