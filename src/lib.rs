//! Decode agent: runs one transcription task at a time for a task controller.

pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod package;
pub mod server;
pub mod staging;
pub mod storage;
pub mod task;
