pub mod gateway;
pub mod llm;
pub mod turn;

pub use gateway::{CompletionFailure, CompletionGateway};
pub use llm::{CompletionProvider, OpenAiProvider};
pub use turn::{Role, Turn, UserId};
