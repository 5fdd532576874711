pub mod anthropic;
pub mod config;
pub mod normalize;
pub mod openai;
pub mod prompts;
pub mod registry;
pub mod storage;

pub use anthropic::AnthropicProvider;
pub use config::ProviderConfig;
pub use openai::OpenAiProvider;
pub use registry::{AnyProvider, build_chain};
pub use storage::HttpObjectStore;
