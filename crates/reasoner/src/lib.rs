//! Reasoner back-ends for AlzAssist.
//!
//! All back-ends implement the `alzassist_core::Reasoner` trait.
//! The router builds the configured back-end from `ReasonerConfig`.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatReasoner;
pub use router::build_from_config;
