mod auth;
mod device;
mod playback;
mod session;
mod store;

pub use auth::AuthState;
pub use auth::EXPIRY_MARGIN_MS;
pub use auth::TokenManager;
pub use auth::TokenSource;
pub use device::DeviceSession;
pub use device::HandlerId;
pub use playback::SegmentScheduler;
pub use playback::check_range;
pub use playback::validate;
pub use session::Session;
pub use store::FileStore;
pub use store::KEY_ACCESS_TOKEN;
pub use store::KEY_CODE_VERIFIER;
pub use store::KEY_EXPIRES_AT;
pub use store::KEY_REFRESH_TOKEN;
pub use store::KeyValueStore;
pub use store::MemoryStore;
