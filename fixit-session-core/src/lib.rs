//! FixIt Session Core
//!
//! Client-side session state for the FixIt ticketing front end:
//! - Durable storage shared by every tab of a browser context
//! - A per-tab token store holding the access token and cached profile
//! - Normalized user profiles with a closed set of capabilities
//! - The route guard state machine that gates protected views

pub mod error;
pub mod guard;
pub mod profile;
pub mod storage;
pub mod token;

pub use error::Error;
pub use guard::{GuardState, GuardView, MountAction, RouteGuard};
pub use profile::{Capabilities, Capability, Feature, Role, StudentProfile, UserProfile};
pub use storage::{
    FileBackend, MemoryBackend, StorageArea, StorageBackend, StorageEvent, TabId, TabStorage,
};
pub use token::{AccessToken, TokenStore, ACCESS_KEY, EXPIRED_KEY, PROFILE_KEY};

/// Result type for fixit-session-core operations
pub type Result<T> = std::result::Result<T, Error>;
