//! LLM provider implementations for skiff.
//!
//! All providers implement the `skiff_core::Provider` trait. The agent loop
//! receives one as an injected dependency and never names a concrete backend.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::OpenAiCompatProvider;
