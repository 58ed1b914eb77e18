pub mod database;
pub mod events;
pub mod subscriber;

pub use events::SyncEvent;
pub use subscriber::init_tracing;
