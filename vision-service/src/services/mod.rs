pub mod conversation_store;
pub mod image_fetcher;
pub mod metrics;
pub mod orchestrator;
pub mod providers;

pub use conversation_store::{ConversationHistory, ConversationStore};
pub use image_fetcher::{FetchError, FetchedImage, ImageFetcher};
pub use orchestrator::{ChatError, ChatOrchestrator};
