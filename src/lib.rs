//! Caching gateway in front of the quran.com content API.
//!
//! Upstream calls go through [`sources::QuranApiClient`], answers are kept in
//! a TTL cache by [`content::ContentService`], and [`storage::JsonStorage`]
//! keeps user reflections and search history on disk.

pub mod cache;
pub mod config;
pub mod console;
pub mod content;
pub mod quran;
pub mod sources;
pub mod storage;
