//! Integration test crate for VEdit.
//!
//! This crate exists solely to hold cross-crate tests. The orchestrator is
//! driven through in-process fake engines, so no ffmpeg or model files are
//! needed.

#[cfg(test)]
mod fakes;

#[cfg(test)]
mod transforms;

#[cfg(test)]
mod recognition;
