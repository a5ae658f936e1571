// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Art style profiles used to augment user prompts
//!
//! The registry is built once at startup and shared read-only between requests.

pub mod registry;

pub use registry::{StyleProfile, StyleRegistry, StyleSummary, DEFAULT_STYLE};
