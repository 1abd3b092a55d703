use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A source document citation attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Backend-reported state of a document ingestion job.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatus {
    Processing { progress: Option<f32> },
    Ready,
    Processed,
    Completed,
    Failed { message: Option<String> },
    /// A status string this client does not know. Not terminal, so
    /// polling keeps going until the attempt bound trips.
    Other(String),
}

impl UploadStatus {
    /// Whether the job has reached a state polling should stop at.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Ready
                | UploadStatus::Processed
                | UploadStatus::Completed
                | UploadStatus::Failed { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, UploadStatus::Failed { .. })
    }
}
