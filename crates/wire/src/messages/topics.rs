//! Topic constants. Requests use `rasp.<domain>.<call>`; replies append
//! `.reply`, `.error`, or `.done` for the end of a streamed reply.

pub const REPLY_SUFFIX: &str = ".reply";
pub const ERROR_SUFFIX: &str = ".error";
pub const DONE_SUFFIX: &str = ".done";

/// Unary: register an agent and obtain its identity.
pub const AGENT_REGISTER: &str = "rasp.agent.register";

/// Unary: deregister an agent on shutdown.
pub const AGENT_CLOSE: &str = "rasp.agent.close";

/// Server-streaming: rule snapshots for one agent.
pub const RULES_SYNC: &str = "rasp.rules.sync";

pub fn reply(topic: &str) -> String {
    format!("{topic}{REPLY_SUFFIX}")
}

pub fn error(topic: &str) -> String {
    format!("{topic}{ERROR_SUFFIX}")
}

pub fn done(topic: &str) -> String {
    format!("{topic}{DONE_SUFFIX}")
}
