//! Core trait abstractions for the extraction library.
//!
//! Applications plug in their own page source, model provider and
//! destination through these traits.

pub mod backend;
pub mod fetcher;
pub mod sink;
