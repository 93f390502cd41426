//! Honyaku - Game Text Translation Proxy
//!
//! Forwards short game text snippets to interchangeable LLM backends with a
//! localization prompt, then restores the source's brackets, quotes and edge
//! punctuation on the generated translation.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod reload;
pub mod server;
pub mod translate;
