//! HTTP route handlers

pub mod control;
pub mod state;
pub mod video;
