// ABOUTME: Event stream reader for the Claude CLI's stream-json output.
// ABOUTME: Decodes events, rebuilds the answer, and runs turns behind the AgentRunner trait.

pub mod codec;
pub mod event;
pub mod progress;
pub mod reader;
pub mod traits;

pub mod backends;
pub mod testing;

pub use backends::claude_cli::{ClaudeCli, ClaudeCliConfig};
pub use event::{StreamEvent, Usage};
pub use reader::{ProcessExit, StreamReader};
pub use traits::{AgentRunner, AgentUpdate, TurnOutcome, TurnRequest};
