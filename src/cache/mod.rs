mod file_cache;
mod message_cache;

pub use file_cache::{stamped_filename, FileCache, PendingFile};
pub use message_cache::MessageCache;
