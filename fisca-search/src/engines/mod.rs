//! Search backend implementations.
//!
//! Each module provides a struct implementing [`crate::engine::SearchBackend`].

pub mod duckduckgo;
pub mod google_cse;
pub mod serpapi;

pub use duckduckgo::DuckDuckGoBackend;
pub use google_cse::GoogleCseBackend;
pub use serpapi::SerpApiBackend;
