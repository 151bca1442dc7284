use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::openai::{ChatClient, ChatError, StreamEvent};
use crate::prompt::{self, BookMetadata, FeedbackPreference};
use crate::transcript::{Credential, Transcript, Turn};

pub const CREDENTIAL_HINT: &str = "Please check that your OpenAI API key is correct.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Only the credential field is usable.
    AwaitingCredential,
    Active,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Please enter your OpenAI API key first.")]
    MissingCredential,
    #[error("Write or paste a review before sending.")]
    EmptyMessage,
    #[error("Something went wrong: {0}")]
    ModelRequest(#[from] ChatError),
}

impl SessionError {
    /// Extra guidance shown next to the message, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SessionError::ModelRequest(_) => Some(CREDENTIAL_HINT),
            _ => None,
        }
    }
}

/// Everything the page needs to re-render one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub state: SessionState,
    pub preference: FeedbackPreference,
    pub book: BookMetadata,
    pub turns: Vec<Turn>,
    pub can_reset: bool,
}

/// State of one interactive session: credential, feedback settings and the
/// visible transcript. Each connection owns its own value.
#[derive(Debug)]
pub struct ReviewSession {
    id: Uuid,
    credential: Option<Credential>,
    preference: FeedbackPreference,
    book: BookMetadata,
    transcript: Transcript,
}

impl Default for ReviewSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            credential: None,
            preference: FeedbackPreference::default(),
            book: BookMetadata::default(),
            transcript: Transcript::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        if self.credential.is_some() {
            SessionState::Active
        } else {
            SessionState::AwaitingCredential
        }
    }

    /// Stores a non-blank credential. Blank input leaves the session as it was;
    /// there is no way back to `AwaitingCredential`.
    pub fn supply_credential(&mut self, raw: &str) -> SessionState {
        if let Some(credential) = Credential::new(raw) {
            if self.credential.is_none() {
                info!(session = %self.id, "Credential supplied, session active");
            }
            self.credential = Some(credential);
        }
        self.state()
    }

    pub fn preference(&self) -> FeedbackPreference {
        self.preference
    }

    pub fn set_preference(&mut self, preference: FeedbackPreference) {
        self.preference = preference;
    }

    pub fn book(&self) -> &BookMetadata {
        &self.book
    }

    pub fn set_book(&mut self, book: BookMetadata) {
        self.book = book;
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Clears the transcript. Credential, preference and book details stay.
    pub fn reset(&mut self) {
        info!(session = %self.id, cleared = self.transcript.len(), "Transcript reset");
        self.transcript.clear();
    }

    /// System message for the next request, built from the current settings.
    pub fn system_prompt(&self) -> String {
        prompt::compose(self.preference, &self.book)
    }

    /// Sends one review (or follow-up) and waits for the streamed reply.
    ///
    /// The user turn is recorded before the request. The assistant turn is only
    /// recorded when the whole reply arrived; after a failure the user turn
    /// stays without an answer.
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn submit(
        &mut self,
        client: &ChatClient,
        text: &str,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<String, SessionError> {
        let credential = self
            .credential
            .clone()
            .ok_or(SessionError::MissingCredential)?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.transcript.push(Turn::user(text));
        let system_text = self.system_prompt();

        let result = client
            .stream_reply(&system_text, self.transcript.turns(), &credential, tx)
            .await;
        match result {
            Ok(reply) => {
                self.transcript.push(Turn::assistant(reply.clone()));
                info!(turns = self.transcript.len(), "Reply recorded");
                Ok(reply)
            }
            Err(e) => {
                warn!(error = %e, "Model request failed");
                Err(e.into())
            }
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state(),
            preference: self.preference,
            book: self.book.clone(),
            turns: self.transcript.turns().to_vec(),
            can_reset: !self.transcript.is_empty(),
        }
    }
}
