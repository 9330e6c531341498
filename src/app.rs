//! Application-level plumbing shared with embedding binaries.

pub mod logging;
