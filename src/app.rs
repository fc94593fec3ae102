use std::path::PathBuf;

use ratatui::layout::Rect;
use tokio::task::JoinHandle;

use crate::backend::{Answer, BackendClient, BackendError, UploadReceipt};
use crate::config::Config;
use crate::session::{Session, SessionPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

type Task<T> = Option<JoinHandle<Result<T, BackendError>>>;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub session: Session,
    pub backend: BackendClient,

    // Question input
    pub query_cursor: usize,

    // File path prompt
    pub show_path_input: bool,
    pub path_input: String,
    pub path_input_cursor: usize,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Outstanding requests
    pub upload_task: Task<UploadReceipt>,
    pub ask_task: Task<Answer>,
    pub clear_task: Task<()>,
    pub probe_task: Task<()>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            session: Session::new(SessionPolicy::from(config)),
            backend: BackendClient::from_config(config),

            query_cursor: 0,

            show_path_input: false,
            path_input: String::new(),
            path_input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,

            upload_task: None,
            ask_task: None,
            clear_task: None,
            probe_task: None,
        }
    }

    // File selection

    pub fn open_path_input(&mut self) {
        if self.session.is_uploading() || self.session.is_clearing() {
            return;
        }
        self.show_path_input = true;
        self.path_input.clear();
        self.path_input_cursor = 0;
    }

    pub fn close_path_input(&mut self) {
        self.show_path_input = false;
        self.path_input.clear();
        self.path_input_cursor = 0;
    }

    /// Select the typed path. The prompt stays open when the file is rejected
    /// so the path can be corrected.
    pub fn confirm_path_input(&mut self) {
        let raw = self.path_input.trim();
        if raw.is_empty() {
            return;
        }
        let path = expand_home(raw);
        if self.session.select_document(&path) {
            self.close_path_input();
        }
    }

    // Requests

    pub fn start_upload(&mut self) {
        let Some(document) = self.session.begin_upload() else {
            return;
        };
        let backend = self.backend.clone();
        self.upload_task = Some(tokio::spawn(async move {
            backend.upload(&document).await
        }));
    }

    pub fn submit_question(&mut self) {
        let Some(text) = self.session.begin_ask() else {
            return;
        };
        self.query_cursor = 0;

        // Scroll to bottom so "Thinking..." is visible
        self.scroll_chat_to_bottom();

        let backend = self.backend.clone();
        self.ask_task = Some(tokio::spawn(async move {
            backend.ask(&text).await
        }));
    }

    pub fn start_new_chat(&mut self) {
        if !self.session.begin_reset() {
            return;
        }
        let backend = self.backend.clone();
        self.clear_task = Some(tokio::spawn(async move {
            backend.clear().await
        }));
    }

    pub fn start_probe(&mut self) {
        if !self.session.begin_probe() {
            return;
        }
        let backend = self.backend.clone();
        self.probe_task = Some(tokio::spawn(async move {
            backend.probe().await
        }));
    }

    /// Hand the results of finished requests to the session
    pub async fn poll_tasks(&mut self) {
        if let Some(result) = take_finished(&mut self.upload_task).await {
            self.session.finish_upload(result);
        }
        if let Some(result) = take_finished(&mut self.ask_task).await {
            self.session.finish_ask(result);
            self.scroll_chat_to_bottom();
        }
        if let Some(result) = take_finished(&mut self.clear_task).await {
            let cleared = result.is_ok();
            self.session.finish_reset(result);
            if cleared {
                // Answers for the old session must not land in the new one
                if let Some(task) = self.ask_task.take() {
                    task.abort();
                }
                self.query_cursor = 0;
                self.chat_scroll = 0;
            }
        }
        if let Some(result) = take_finished(&mut self.probe_task).await {
            self.session.apply_probe(result);
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    /// Scroll chat to bottom so the latest message is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.session.messages() {
            total_lines = total_lines.saturating_add(1); // Role line ("You:" or "Bot:")
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = char_count.div_ceil(wrap_width).max(1);
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.session.is_asking() {
            total_lines = total_lines.saturating_add(2); // "Bot:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    #[cfg(test)]
    pub async fn wait_idle(&mut self) {
        while self.upload_task.is_some()
            || self.ask_task.is_some()
            || self.clear_task.is_some()
            || self.probe_task.is_some()
        {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.poll_tasks().await;
        }
    }
}

async fn take_finished<T>(task: &mut Task<T>) -> Option<Result<T, BackendError>> {
    if !task.as_ref().is_some_and(|t| t.is_finished()) {
        return None;
    }
    let handle = task.take()?;
    match handle.await {
        Ok(result) => Some(result),
        Err(err) if err.is_cancelled() => None,
        Err(err) => {
            tracing::error!(error = %err, "request task failed");
            Some(Err(BackendError::Request(format!("request task failed: {}", err))))
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
