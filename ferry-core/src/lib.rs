// ABOUTME: Delivery side of ferry - throttled streaming into a message surface.
// ABOUTME: Also holds config, sessions, rate limiting, and command parsing for the bot.

pub mod chunking;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod locks;
pub mod metrics;
pub mod paths;
pub mod rate_limit;
pub mod relay;
pub mod render;
pub mod session;
pub mod testing;

pub use config::Config;
pub use delivery::{
    Delivery, DeliverySettings, DeliveryThrottler, Draft, Format, MessageRef, MessageSurface,
    SurfaceError,
};
pub use locks::{TurnGuard, TurnLocks};
pub use rate_limit::{RateDecision, RateLimiter};
pub use relay::{run_turn, TurnReport};
pub use session::SessionStore;

// Re-export ferry-agent types
pub use ferry_agent::{AgentRunner, AgentUpdate, TurnOutcome, TurnRequest};
