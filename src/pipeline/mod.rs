//! Pipeline stages for SVG-to-PNG fallback conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the HTTP backend can be swapped for a fake in tests.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ paths ──▶ options ──▶ cloudconvert ──▶ fallback file
//!  (.svg)    (.png)    (resize /    (upload, wait,
//!                       density)     download)
//! ```
//!
//! 1. [`paths`]       : derive the fallback path and probe for it
//! 2. [`options`]     : turn [`crate::Settings`] into converter options and
//!    assemble the upload job
//! 3. [`cloudconvert`]: the [`cloudconvert::Converter`] seam and its HTTP
//!    implementation; the only stage with network I/O

pub mod cloudconvert;
pub mod options;
pub mod paths;
