pub mod config;
pub mod error;
pub mod generator;
pub mod manager;
pub mod providers;
pub mod assistants;


pub use config::*;
pub use error::*;
pub use generator::{GenerationRequest, TextGenerator};
pub use manager::LLMManager;
pub use assistants::{AssistantCatalog, AssistantPreset};
