pub mod client;
pub mod error;
pub mod links;
pub mod models;
pub mod profile;

pub use client::SpotifyClient;
pub use error::SpotifyError;
pub use links::{parse_link, LinkKind, SpotifyLink};
pub use models::*;
pub use profile::DisplayProfile;
