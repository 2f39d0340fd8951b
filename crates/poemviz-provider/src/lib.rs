//! Clients for external text-to-image providers.
//!
//! This crate provides:
//! - The `ImageProvider` capability: one request attempt for one directive
//! - Concrete providers for OpenAI-style and Imagen-style endpoints
//! - `GenerationClient`: bounded retries with exponential backoff and a
//!   per-attempt timeout around any provider
//!
//! Sequencing and concurrency are the caller's concern.

pub mod client;
pub mod config;
pub mod error;
pub mod image_ref;
pub mod imagen;
pub mod metrics;
pub mod openai;
pub mod provider;
pub mod retry;

pub use client::{GeneratedImage, GenerationClient};
pub use config::{ImagenConfig, OpenAiConfig, ProviderConfig};
pub use error::{ProviderError, ProviderResult};
pub use imagen::ImagenProvider;
pub use openai::OpenAiProvider;
pub use provider::{build_provider, ImageProvider};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
