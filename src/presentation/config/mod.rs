mod environment;
mod settings;

pub use environment::Environment;
pub use settings::{
    OllamaSettings, QuickbaseSettings, ServerSettings, Settings, WorkerSettings,
};
