//! Task loop: generator reply → fragments → execution → feedback.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use serde_json::{json, Value};

use crate::{
    console::Console,
    error::{Error, Result},
    events::{Event, EventBus},
    execution::{CodeBlocks, Runner},
    llm::Generator,
};

pub mod manager;
pub mod parser;

pub use manager::TaskManager;
pub use parser::parse_reply;

pub const MAX_ROUNDS: usize = 16;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The reply carried no `main` fragment.
    NoMain,
    /// The generator returned nothing.
    EmptyReply,
    RoundLimit,
    Stopped,
    GeneratorFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub rounds: usize,
    pub elapsed: Duration,
    pub stop: StopReason,
}

/// Collaborators borrowed for one run of the loop.
pub struct TaskContext<'a> {
    pub llm: &'a mut dyn Generator,
    pub runner: &'a mut Runner,
    pub console: &'a dyn Console,
    pub bus: &'a EventBus,
    /// Model override for every generator call of this run.
    pub target: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub instruction: String,
    system_prompt: Option<String>,
    max_rounds: Option<usize>,
}

impl Task {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().simple().to_string(),
            instruction: instruction.into(),
            system_prompt: None,
            max_rounds: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Round budget: the per-call override, else the task's, else
    /// [`MAX_ROUNDS`]; zero counts as unset.
    fn round_budget(&self, max_rounds: Option<usize>) -> usize {
        max_rounds
            .filter(|n| *n >= 1)
            .or(self.max_rounds.filter(|n| *n >= 1))
            .unwrap_or(MAX_ROUNDS)
    }

    /// Drive the loop. `instruction` is a follow-up on this task; without it
    /// the task's own instruction starts the conversation, together with the
    /// system prompt.
    pub async fn run(
        &self,
        ctx: &mut TaskContext<'_>,
        instruction: Option<&str>,
        max_rounds: Option<usize>,
    ) -> TaskReport {
        let started = Instant::now();
        ctx.bus.reset_stop();
        ctx.console.panel("💁 Start processing instruction", instruction.unwrap_or(&self.instruction));

        let (prompt, system_prompt) = match instruction {
            Some(text) => (text.to_string(), None),
            None => {
                let prompt = self.build_user_prompt(ctx.console);
                ctx.bus.broadcast(Event::TaskStart(&prompt));
                (prompt.to_string(), self.system_prompt.as_deref())
            }
        };

        let budget = self.round_budget(max_rounds);
        tracing::info!(task_id = %self.task_id, budget, "task started");
        let mut rounds = 0;
        let mut reply = ctx.llm.send(&prompt, system_prompt, ctx.target).await;
        let stop = loop {
            let text = match reply {
                Ok(text) if text.trim().is_empty() => break StopReason::EmptyReply,
                Ok(text) => text,
                Err(e) => {
                    ctx.console.print(&format!("❌ LLM call failed: {e:#}"));
                    tracing::error!(error = %e, "generator call failed");
                    break StopReason::GeneratorFailed;
                }
            };
            let blocks = parse_reply(&text);
            if !blocks.contains_key("main") {
                break StopReason::NoMain;
            }
            rounds += 1;
            reply = self.process_code_reply(ctx, &blocks).await;
            if ctx.bus.is_stopped() {
                break StopReason::Stopped;
            }
            if rounds >= budget {
                break StopReason::RoundLimit;
            }
        };

        self.print_summary(ctx);
        let report = TaskReport { rounds, elapsed: started.elapsed(), stop };
        tracing::info!(task_id = %self.task_id, rounds, stop = ?stop, "task finished");
        report
    }

    /// Execute the `main` fragment and send the result back as the next prompt.
    pub async fn process_code_reply(
        &self,
        ctx: &mut TaskContext<'_>,
        blocks: &CodeBlocks,
    ) -> anyhow::Result<String> {
        let code = blocks.get("main").map(String::as_str).unwrap_or_default();
        ctx.bus.broadcast(Event::Exec(blocks));
        ctx.console.code_panel("🚀 Start executing code block", code);

        let result = ctx.runner.execute(code, blocks);
        ctx.bus.broadcast(Event::Result(&result));
        let result = result.to_json_pretty();
        ctx.console.panel("✅ Execution result", &result);

        ctx.console.status("Start sending feedback...");
        let feedback = self.feedback_prompt(&result);
        ctx.llm.send(&feedback, None, ctx.target).await
    }

    /// Re-process the generator's last reply for one round.
    pub async fn step(&self, ctx: &mut TaskContext<'_>) -> Option<anyhow::Result<String>> {
        let Some(reply) = ctx.llm.last_reply() else {
            ctx.console.print("❌ No context information found");
            return None;
        };
        let blocks = parse_reply(&reply);
        if !blocks.contains_key("main") {
            ctx.console.print("❌ Last reply has no main code block");
            return None;
        }
        Some(self.process_code_reply(ctx, &blocks).await)
    }

    /// Plain conversation turn. The system prompt goes out only when the
    /// conversation is empty.
    pub async fn chat(&self, ctx: &mut TaskContext<'_>, prompt: &str) -> anyhow::Result<String> {
        let system_prompt = if ctx.llm.is_empty() { self.system_prompt.as_deref() } else { None };
        ctx.llm.send(prompt, system_prompt, ctx.target).await
    }

    pub fn feedback_prompt(&self, result_json: &str) -> String {
        format!(
            "# Initial mission\n{}\n\n# Code execution result feedback\n{}",
            self.instruction, result_json
        )
    }

    pub fn build_user_prompt(&self, console: &dyn Console) -> Value {
        let mut prompt = json!({
            "task": self.instruction,
            "runtime": format!("rhai {}", env!("CARGO_PKG_VERSION")),
            "platform": format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            "today": chrono::Local::now().date_naive().to_string(),
            "work_dir": std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        });
        if console.is_quiet() {
            prompt["display"] =
                json!("Save images to files and show them with runtime.display(path).");
        } else {
            prompt["TERM"] = json!(std::env::var("TERM").ok());
            prompt["LC_TERMINAL"] = json!(std::env::var("LC_TERMINAL").ok());
        }
        prompt
    }

    fn print_summary(&self, ctx: &TaskContext<'_>) {
        let summary = ctx.llm.summary().map(|s| s.to_string()).unwrap_or_default();
        ctx.bus.broadcast(Event::Summary(&summary));
        ctx.console.print(&format!("\n⏹ End of instruction {summary}"));
    }

    /// Write `{instruction, llm, runner}` as JSON under `dir`.
    pub fn save(&self, dir: &Path, llm: &dyn Generator, runner: &Runner) -> Result<PathBuf> {
        let record = json!({
            "instruction": self.instruction,
            "llm": llm.transcript(),
            "runner": runner.history(),
        });
        let stem = safe_filename(&self.instruction).unwrap_or_else(|| self.task_id.clone());
        let path = dir.join(format!("{stem}.json"));
        let text = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, text).map_err(|source| Error::Export { path: path.clone(), source })?;
        tracing::info!(path = %path.display(), "task saved");
        Ok(path)
    }
}

/// File stem from free text: alphanumerics kept, runs of anything else
/// collapsed to `_`, at most 32 characters.
pub fn safe_filename(text: &str) -> Option<String> {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
        if out.chars().count() >= 32 {
            break;
        }
    }
    let out = out.trim_matches('_').to_string();
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_filename_rules() {
        assert_eq!(safe_filename("List files in /tmp!").as_deref(), Some("List_files_in_tmp"));
        assert_eq!(safe_filename("?!").as_deref(), None);
        assert_eq!(safe_filename("画一个图").as_deref(), Some("画一个图"));
        let long = "a".repeat(100);
        assert_eq!(safe_filename(&long).map(|s| s.chars().count()), Some(32));
    }

    #[test]
    fn budget_prefers_call_then_task_then_default() {
        let task = Task::new("t");
        assert_eq!(task.round_budget(None), MAX_ROUNDS);
        assert_eq!(task.round_budget(Some(0)), MAX_ROUNDS);
        let task = task.with_max_rounds(Some(3));
        assert_eq!(task.round_budget(None), 3);
        assert_eq!(task.round_budget(Some(1)), 1);
    }

    #[test]
    fn feedback_embeds_instruction_and_result() {
        let task = Task::new("count files");
        let prompt = task.feedback_prompt("{\"stdout\": \"3\"}");
        assert!(prompt.starts_with("# Initial mission\ncount files\n\n# Code execution result feedback\n"));
        assert!(prompt.ends_with("{\"stdout\": \"3\"}"));
    }
}
