// ABOUTME: AgentRunner implementations.
// ABOUTME: The Claude CLI runner is the only production backend.

pub mod claude_cli;
