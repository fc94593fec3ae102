//! UI-agnostic chat session state
//!
//! The session owns the transcript, the selected document and the loading
//! flags of each flow. It never touches the network: callers take the work
//! item returned by a `begin_*` method, run the request, and hand the result
//! back to the matching `finish_*` method.

use std::path::Path;

use crate::backend::{Answer, BackendError, UploadReceipt};
use crate::config::Config;
use crate::document::Document;

/// A chat message in the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Bot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    Connected,
    #[default]
    Connecting,
    Disconnected,
}

impl Connectivity {
    pub fn label(&self) -> &'static str {
        match self {
            Connectivity::Connected => "Connected",
            Connectivity::Connecting => "Connecting",
            Connectivity::Disconnected => "Disconnected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub max_upload_bytes: u64,
    pub require_upload: bool,
    pub block_when_disconnected: bool,
}

impl From<&Config> for SessionPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            require_upload: config.require_upload,
            block_when_disconnected: config.block_when_disconnected,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    policy: SessionPolicy,

    messages: Vec<ChatMessage>,
    document: Option<Document>,
    uploaded: bool,
    pub question: String,

    error: Option<String>,
    notice: Option<String>,
    status: Connectivity,

    uploading: bool,
    asking: bool,
    clearing: bool,
    probing: bool,
}

impl Session {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            messages: Vec::new(),
            document: None,
            uploaded: false,
            question: String::new(),
            error: None,
            notice: None,
            status: Connectivity::Connecting,
            uploading: false,
            asking: false,
            clearing: false,
            probing: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn status(&self) -> Connectivity {
        self.status
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn is_asking(&self) -> bool {
        self.asking
    }

    pub fn is_clearing(&self) -> bool {
        self.clearing
    }

    pub fn is_busy(&self) -> bool {
        self.uploading || self.asking || self.clearing
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    // Upload flow

    /// Select a new document. A rejected selection only sets the error; the
    /// previous document and its upload state are kept.
    pub fn select_document(&mut self, path: &Path) -> bool {
        if self.uploading || self.clearing {
            return false;
        }
        match Document::open(path, self.policy.max_upload_bytes) {
            Ok(document) => {
                tracing::info!(file = %document.name, size = document.size, "document selected");
                self.document = Some(document);
                self.uploaded = false;
                self.error = None;
                self.notice = None;
                true
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "document rejected");
                self.error = Some(err.to_string());
                false
            }
        }
    }

    pub fn can_upload(&self) -> bool {
        self.document.is_some() && !self.uploaded && !self.uploading && !self.clearing
    }

    pub fn begin_upload(&mut self) -> Option<Document> {
        if !self.can_upload() {
            return None;
        }
        self.uploading = true;
        self.error = None;
        self.notice = None;
        self.document.clone()
    }

    pub fn finish_upload(&mut self, result: Result<UploadReceipt, BackendError>) {
        self.uploading = false;
        match result {
            Ok(receipt) => {
                self.uploaded = true;
                self.status = Connectivity::Connected;
                self.notice = Some(
                    receipt
                        .message
                        .unwrap_or_else(|| "Document uploaded".to_string()),
                );
            }
            Err(err) => {
                self.note_failure(&err);
                self.error = Some(format!("Error uploading file: {}", err));
            }
        }
    }

    // Question flow

    pub fn can_ask(&self) -> bool {
        !self.question.trim().is_empty()
            && !self.asking
            && !self.clearing
            && (self.uploaded || !self.policy.require_upload)
            && !(self.policy.block_when_disconnected && self.status == Connectivity::Disconnected)
    }

    /// Why the question cannot be submitted right now, if anything
    pub fn ask_blocker(&self) -> Option<&'static str> {
        if self.asking {
            Some("Waiting for the previous answer")
        } else if self.clearing {
            Some("Starting a new chat")
        } else if self.policy.require_upload && !self.uploaded {
            Some("Upload a document first")
        } else if self.policy.block_when_disconnected && self.status == Connectivity::Disconnected {
            Some("Backend is disconnected")
        } else {
            None
        }
    }

    /// Move the question into the transcript and return the text to send
    pub fn begin_ask(&mut self) -> Option<String> {
        if !self.can_ask() {
            return None;
        }
        let text = std::mem::take(&mut self.question);
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: text.clone(),
        });
        self.asking = true;
        self.error = None;
        Some(text)
    }

    pub fn finish_ask(&mut self, result: Result<Answer, BackendError>) {
        self.asking = false;
        let content = match result {
            Ok(answer) => {
                self.status = Connectivity::Connected;
                format_answer(&answer)
            }
            Err(err) => {
                self.note_failure(&err);
                self.error = Some(format!("Error getting answer: {}", err));
                format!("Sorry, I couldn't get an answer. {}", err)
            }
        };
        self.messages.push(ChatMessage {
            role: ChatRole::Bot,
            content,
        });
    }

    // New chat

    /// Refused while an upload is outstanding: the backend would still
    /// ingest the document after the clear.
    pub fn begin_reset(&mut self) -> bool {
        if self.clearing || self.uploading {
            return false;
        }
        self.clearing = true;
        self.error = None;
        true
    }

    /// Local state is dropped only once the backend confirmed the clear,
    /// so the two never disagree about which document is active.
    pub fn finish_reset(&mut self, result: Result<(), BackendError>) {
        self.clearing = false;
        match result {
            Ok(()) => {
                self.messages.clear();
                self.document = None;
                self.uploaded = false;
                self.question.clear();
                self.error = None;
                self.notice = None;
                // An outstanding answer is abandoned by the caller
                self.asking = false;
                self.status = Connectivity::Connected;
            }
            Err(err) => {
                self.note_failure(&err);
                self.error = Some(format!("Could not start a new chat: {}", err));
            }
        }
    }

    // Connectivity

    pub fn begin_probe(&mut self) -> bool {
        if self.probing {
            return false;
        }
        self.probing = true;
        if self.status == Connectivity::Disconnected {
            self.status = Connectivity::Connecting;
        }
        true
    }

    pub fn apply_probe(&mut self, result: Result<(), BackendError>) {
        self.probing = false;
        self.status = match result {
            Ok(()) => Connectivity::Connected,
            Err(_) => Connectivity::Disconnected,
        };
    }

    fn note_failure(&mut self, err: &BackendError) {
        if err.is_connectivity_loss() {
            self.status = Connectivity::Disconnected;
        }
    }
}

fn format_answer(answer: &Answer) -> String {
    if answer.sources.is_empty() {
        return answer.answer.clone();
    }
    let mut text = answer.answer.trim_end().to_string();
    text.push_str("\n\n**Sources:**");
    for (i, source) in answer.sources.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, source));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn policy() -> SessionPolicy {
        SessionPolicy {
            max_upload_bytes: 64,
            require_upload: true,
            block_when_disconnected: true,
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, len: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![b'x'; len]).unwrap();
        path
    }

    fn answer(text: &str) -> Answer {
        Answer {
            answer: text.to_string(),
            sources: Vec::new(),
            elapsed: Duration::from_millis(10),
        }
    }

    /// Session with a confirmed upload and a live backend
    fn ready_session(dir: &tempfile::TempDir) -> Session {
        let mut session = Session::new(policy());
        session.apply_probe(Ok(()));
        assert!(session.select_document(&write_file(dir, "faq.txt", 10)));
        session.begin_upload().unwrap();
        session.finish_upload(Ok(UploadReceipt::default()));
        session
    }

    #[test]
    fn test_oversized_selection_keeps_confirmed_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);

        assert!(!session.select_document(&write_file(&dir, "huge.pdf", 65)));

        assert!(session.is_uploaded());
        assert_eq!(session.document().unwrap().name, "faq.txt");
        assert!(session.error().unwrap().contains("File size must be less than"));
    }

    #[test]
    fn test_new_selection_unconfirms_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);

        assert!(session.select_document(&write_file(&dir, "other.docx", 5)));
        assert!(!session.is_uploaded());
        assert!(session.can_upload());
    }

    #[test]
    fn test_upload_gates_questions() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(policy());
        session.apply_probe(Ok(()));
        session.question = "What are the working hours?".to_string();

        assert!(!session.can_ask());
        assert_eq!(session.ask_blocker(), Some("Upload a document first"));
        assert!(session.begin_ask().is_none());

        session.select_document(&write_file(&dir, "faq.txt", 10));
        let doc = session.begin_upload().unwrap();
        assert_eq!(doc.name, "faq.txt");
        assert!(!session.can_upload());
        session.finish_upload(Ok(UploadReceipt { message: Some("File processed successfully".into()) }));

        assert!(session.can_ask());
        assert_eq!(session.notice(), Some("File processed successfully"));
    }

    #[test]
    fn test_upload_gate_can_be_disabled() {
        let mut session = Session::new(SessionPolicy { require_upload: false, ..policy() });
        session.question = "hello".to_string();
        assert!(session.can_ask());
    }

    #[test]
    fn test_failed_upload_leaves_flag_unset() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(policy());
        session.select_document(&write_file(&dir, "faq.txt", 10));
        session.begin_upload().unwrap();
        session.finish_upload(Err(BackendError::Status { status: 500, message: "boom".into() }));

        assert!(!session.is_uploaded());
        assert!(!session.is_uploading());
        assert_eq!(session.error(), Some("Error uploading file: Server error 500: boom"));
        // Manual retry is possible
        assert!(session.can_upload());
    }

    #[test]
    fn test_ask_appends_one_message_each_side() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "  How do I reset my password?  ".to_string();

        let sent = session.begin_ask().unwrap();
        assert_eq!(sent, "  How do I reset my password?  ");
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, ChatRole::User);
        assert!(session.question.is_empty());

        session.finish_ask(Ok(answer("Use the self-service portal.")));
        assert_eq!(session.messages().len(), 2);
        assert_eq!(
            session.messages()[1],
            ChatMessage { role: ChatRole::Bot, content: "Use the self-service portal.".into() }
        );
    }

    #[test]
    fn test_whitespace_question_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = " \t\n".to_string();
        assert!(session.begin_ask().is_none());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_second_submit_while_outstanding_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "first".to_string();
        assert!(session.begin_ask().is_some());

        session.question = "second".to_string();
        assert!(!session.can_ask());
        assert!(session.begin_ask().is_none());
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_failed_ask_reports_in_transcript_and_banner() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "anything".to_string();
        session.begin_ask().unwrap();

        session.finish_ask(Err(BackendError::Status { status: 500, message: "boom".into() }));

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, ChatRole::Bot);
        assert!(session.messages()[1].content.contains("Server error 500: boom"));
        assert_eq!(session.error(), Some("Error getting answer: Server error 500: boom"));
        assert_eq!(session.status(), Connectivity::Connected);
    }

    #[test]
    fn test_unreachable_ask_flips_connectivity() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "anything".to_string();
        session.begin_ask().unwrap();

        session.finish_ask(Err(BackendError::Unreachable { url: "http://localhost:8000".into() }));

        assert_eq!(session.status(), Connectivity::Disconnected);
        session.question = "again".to_string();
        assert!(!session.can_ask());
    }

    #[test]
    fn test_answer_lists_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "q".to_string();
        session.begin_ask().unwrap();
        session.finish_ask(Ok(Answer {
            answer: "Nine to five.\n".into(),
            sources: vec!["handbook.pdf".into(), "it-faq.txt".into()],
            elapsed: Duration::ZERO,
        }));

        assert_eq!(
            session.messages()[1].content,
            "Nine to five.\n\n**Sources:**\n1. handbook.pdf\n2. it-faq.txt"
        );
    }

    #[test]
    fn test_reset_clears_only_after_backend_confirms() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "q".to_string();
        session.begin_ask().unwrap();
        session.finish_ask(Ok(answer("a")));
        session.question = "draft".to_string();

        assert!(session.begin_reset());
        assert!(!session.begin_reset());
        assert!(!session.can_ask());
        // Nothing is dropped while the clear is outstanding
        assert_eq!(session.messages().len(), 2);

        session.finish_reset(Ok(()));
        assert!(session.messages().is_empty());
        assert!(session.document().is_none());
        assert!(!session.is_uploaded());
        assert!(session.question.is_empty());
        assert!(session.error().is_none());
    }

    #[test]
    fn test_reset_refused_while_uploading() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(policy());
        session.select_document(&write_file(&dir, "faq.txt", 10));
        session.begin_upload().unwrap();

        assert!(!session.begin_reset());
        assert!(!session.is_clearing());

        session.finish_upload(Ok(UploadReceipt::default()));
        assert!(session.begin_reset());
        session.finish_reset(Ok(()));
        assert!(session.document().is_none());
        assert!(!session.is_uploaded());
    }

    #[test]
    fn test_failed_reset_keeps_local_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "q".to_string();
        session.begin_ask().unwrap();
        session.finish_ask(Ok(answer("a")));

        session.begin_reset();
        session.finish_reset(Err(BackendError::Status { status: 500, message: "busy".into() }));

        assert_eq!(session.messages().len(), 2);
        assert!(session.is_uploaded());
        assert_eq!(session.error(), Some("Could not start a new chat: Server error 500: busy"));
    }

    #[test]
    fn test_probe_failure_blocks_until_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(&dir);
        session.question = "q".to_string();

        assert!(session.begin_probe());
        assert!(!session.begin_probe());
        session.apply_probe(Err(BackendError::Unreachable { url: "u".into() }));
        assert_eq!(session.status(), Connectivity::Disconnected);
        assert!(!session.can_ask());
        assert_eq!(session.ask_blocker(), Some("Backend is disconnected"));

        assert!(session.begin_probe());
        assert_eq!(session.status(), Connectivity::Connecting);
        session.apply_probe(Ok(()));
        assert_eq!(session.status(), Connectivity::Connected);
        assert!(session.can_ask());
    }

    #[test]
    fn test_disconnect_blocking_can_be_disabled() {
        let mut session = Session::new(SessionPolicy {
            require_upload: false,
            block_when_disconnected: false,
            ..policy()
        });
        session.apply_probe(Err(BackendError::Unreachable { url: "u".into() }));
        session.question = "q".to_string();
        assert!(session.can_ask());
    }

    #[test]
    fn test_initial_status_is_connecting() {
        assert_eq!(Session::new(policy()).status(), Connectivity::Connecting);
    }
}
