#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use aipy::{
    console::Console,
    events::EventBus,
    execution::{EnvEntry, Runner, RunnerSettings},
    llm::{Generator, UsageSummary},
};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Console that answers `input` from a queue and records everything printed.
#[derive(Default)]
pub struct ScriptedConsole {
    inputs: Mutex<VecDeque<String>>,
    pub output: Mutex<Vec<String>>,
}

impl ScriptedConsole {
    pub fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: Mutex::new(inputs.iter().map(|s| s.to_string()).collect()),
            output: Mutex::default(),
        }
    }

    pub fn printed(&self) -> String {
        self.output.lock().unwrap().join("\n")
    }
}

impl Console for ScriptedConsole {
    fn print(&self, text: &str) {
        self.output.lock().unwrap().push(text.to_string());
    }

    fn input(&self, prompt: &str) -> String {
        self.print(prompt);
        self.inputs.lock().unwrap().pop_front().unwrap_or_default()
    }

    fn is_quiet(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub prompt: String,
    pub system_prompt: Option<String>,
}

/// Generator replaying canned replies; once they run out it repeats
/// `repeat`, or returns an empty reply.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: VecDeque<anyhow::Result<String>>,
    repeat: Option<String>,
    pub sent: Arc<Mutex<Vec<Sent>>>,
    messages: Vec<Value>,
    last: Option<String>,
}

impl ScriptedGenerator {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| Ok(r.to_string())).collect(),
            ..Default::default()
        }
    }

    pub fn repeating(reply: &str) -> Self {
        Self { repeat: Some(reply.to_string()), ..Default::default() }
    }

    pub fn failing(message: &str) -> Self {
        let mut generator = Self::default();
        generator.replies.push_back(Err(anyhow::anyhow!(message.to_string())));
        generator
    }

    pub fn sent_log(&self) -> Arc<Mutex<Vec<Sent>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn send(
        &mut self,
        prompt: &str,
        system_prompt: Option<&str>,
        _target: Option<&str>,
    ) -> anyhow::Result<String> {
        self.sent.lock().unwrap().push(Sent {
            prompt: prompt.to_string(),
            system_prompt: system_prompt.map(str::to_string),
        });
        let reply = match self.replies.pop_front() {
            Some(reply) => reply?,
            None => self.repeat.clone().unwrap_or_default(),
        };
        if let Some(sp) = system_prompt {
            self.messages.push(json!({"role": "system", "content": sp}));
        }
        self.messages.push(json!({"role": "user", "content": prompt}));
        self.messages.push(json!({"role": "assistant", "content": reply}));
        self.last = Some(reply.clone());
        Ok(reply)
    }

    fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn last_reply(&self) -> Option<String> {
        self.last.clone()
    }

    fn summary(&self) -> Option<UsageSummary> {
        let rounds = self.sent.lock().unwrap().len();
        Some(UsageSummary { rounds, ..Default::default() })
    }

    fn transcript(&self) -> Value {
        Value::Array(self.messages.clone())
    }

    fn clear(&mut self) {
        self.messages.clear();
        self.last = None;
    }
}

pub fn main_block(code: &str) -> String {
    format!("Here is the code:\n```rhai main\n{code}\n```\n")
}

pub fn runner_with(settings: RunnerSettings, console: Arc<ScriptedConsole>) -> Runner {
    Runner::new(
        settings,
        console,
        Arc::new(EventBus::new()),
        Vec::<(String, EnvEntry)>::new(),
    )
}

pub fn runner() -> Runner {
    runner_with(RunnerSettings::default(), Arc::new(ScriptedConsole::default()))
}
