// ABOUTME: Test doubles for code that drives an AgentRunner.
// ABOUTME: ScriptedRunner replays canned stream-json through the real StreamReader.

pub mod scripted;

pub use scripted::{Script, ScriptedRunner};
