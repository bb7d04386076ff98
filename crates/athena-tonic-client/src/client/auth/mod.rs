pub mod cache;
pub mod provider;
pub mod snapshot;

pub use cache::{TokenCache, TokenCacheOptions};
pub use provider::{AuthLayer, AuthService, StaticToken, TokenProvider};
pub use snapshot::TokenSnapshot;
