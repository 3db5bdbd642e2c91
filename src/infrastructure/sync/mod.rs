mod quickbase_sync;

pub use quickbase_sync::{QuickbaseConfig, QuickbaseSync};
