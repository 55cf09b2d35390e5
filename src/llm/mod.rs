pub mod prompts;
pub mod types;

#[cfg(feature = "groq")]
pub mod client;

#[cfg(feature = "groq")]
pub use client::*;
pub use types::*;
