// ABOUTME: ferry binary support - Telegram bot loop, message handler, and terminal surface.
// ABOUTME: The streaming pipeline itself lives in ferry-agent and ferry-core.

pub mod handler;
pub mod telegram;
pub mod terminal;

pub use ferry_core::config;
