pub mod agent;

pub use agent::{Agent, AgentControl, Instruction};
