mod ollama_extractor;

pub use ollama_extractor::OllamaExtractor;
