//! Execution engine: persistent Rhai context, result and history types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod capture;
pub mod interrupt;
pub mod outcome;
pub mod packages;
pub mod qpy;
pub mod runner;
pub mod runtime;
pub mod value;

pub use capture::{CaptureGuard, Captured, OutputSink};
pub use interrupt::InterruptHandle;
pub use outcome::Outcome;
pub use runner::{Runner, RunnerSettings};
pub use runtime::Runtime;

pub const MSG_SUCCESS: &str = "The operation completed successfully";
pub const MSG_INTERRUPTED: &str = "Execution was interrupted by the user";
pub const MASKED: &str = "<masked>";
pub const FILTERED: &str = "<filtered>";
pub const FILTERED_STREAM: &str = "<filtered: cannot json-serialize>";

/// Fragment name to source text, as parsed from one generator reply.
pub type CodeBlocks = BTreeMap<String, String>;

/// Secrets/config values known to the runner, redacted from results.
pub type EnvMap = BTreeMap<String, EnvEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// Sanitized report of one execution, fed back to the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errstr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(rename = "__result__", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl StructuredResult {
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// One entry of the runner history. Entry #0 is always `Initial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    Execution {
        code: String,
        result: StructuredResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env: Option<Map<String, Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Map<String, Value>>,
    },
    Initial {
        env: EnvMap,
    },
}
