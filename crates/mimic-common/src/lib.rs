pub mod errors;
pub mod id;
pub mod types;

pub use errors::{AudioError, ClientError, ConfigError, MimicError};
pub use id::{new_correlation_id, new_id, PersonaId, ThreadId, UploadJobId};
pub use types::{ChatMessage, ChatRole, Citation, UploadStatus};

pub type Result<T> = std::result::Result<T, MimicError>;
