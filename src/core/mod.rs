//! Core types: actions, errors, and host seams.

pub mod action;
pub mod error;
pub mod source;
