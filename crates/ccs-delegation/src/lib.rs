//! Headless delegation to an external CLI agent.
//!
//! The agent emits newline-delimited JSON events on stdout
//! (`--output-format stream-json`). This crate decodes that stream
//! incrementally ([`decoder`]), models the events ([`event`]), folds them into
//! one result record ([`aggregator`]), formats tool calls for progress output
//! ([`verbose`]), and drives the subprocess end to end ([`executor`]).

pub mod aggregator;
pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod executor;
pub mod verbose;

pub use aggregator::{
    ExecutionResult, ResultParams, SessionInfo, build_execution_result, extract_session_info,
};
pub use config::DelegationConfig;
pub use decoder::StreamDecoder;
pub use error::{DecodeError, ExecutorError};
pub use event::StreamEvent;
pub use executor::{ExecutionOptions, HeadlessExecutor};
pub use verbose::format_tool_verbose;
