//! Owns the long-lived pieces (generator, runner, bus) and the open task.

use std::{path::PathBuf, sync::Arc};

use crate::{
    config::Config,
    console::Console,
    error::Result,
    events::EventBus,
    execution::{EnvEntry, InterruptHandle, Runner, RunnerSettings},
    llm::Generator,
};

use super::{Task, TaskContext, TaskReport};

pub struct TaskManager {
    console: Arc<dyn Console>,
    bus: Arc<EventBus>,
    llm: Box<dyn Generator>,
    runner: Runner,
    task: Option<Task>,
    system_prompt: Option<String>,
    max_rounds: Option<usize>,
    save_dir: Option<PathBuf>,
    target: Option<String>,
}

impl TaskManager {
    pub fn new(
        cfg: &Config,
        console: Arc<dyn Console>,
        bus: Arc<EventBus>,
        llm: Box<dyn Generator>,
    ) -> Self {
        let seeds = cfg
            .env_seeds()
            .into_iter()
            .map(|(name, value)| (name, EnvEntry { value, desc: None }));
        let runner = Runner::new(RunnerSettings::from_config(cfg), console.clone(), bus.clone(), seeds);
        Self {
            console,
            bus,
            llm,
            runner,
            task: None,
            system_prompt: None,
            max_rounds: cfg.get_usize("MAX_ROUNDS"),
            save_dir: Some(cfg.task_save_path()),
            target: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        if max_rounds.is_some() {
            self.max_rounds = max_rounds;
        }
        self
    }

    /// Where `done` exports tasks; `None` disables saving.
    pub fn with_save_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.save_dir = dir;
        self
    }

    /// Model override for every generator call.
    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.runner.interrupt_handle()
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Start a task for `instruction`, or follow up on the open one.
    pub async fn run(&mut self, instruction: &str) -> TaskReport {
        let follow_up = self.task.is_some();
        let task = self.task.get_or_insert_with(|| {
            Task::new(instruction)
                .with_system_prompt(self.system_prompt.clone())
                .with_max_rounds(self.max_rounds)
        });
        let mut ctx = TaskContext {
            llm: self.llm.as_mut(),
            runner: &mut self.runner,
            console: self.console.as_ref(),
            bus: &self.bus,
            target: self.target.as_deref(),
        };
        task.run(&mut ctx, follow_up.then_some(instruction), None).await
    }

    pub async fn chat(&mut self, prompt: &str) -> anyhow::Result<String> {
        let task = self.task.get_or_insert_with(|| {
            Task::new(prompt).with_system_prompt(self.system_prompt.clone())
        });
        let mut ctx = TaskContext {
            llm: self.llm.as_mut(),
            runner: &mut self.runner,
            console: self.console.as_ref(),
            bus: &self.bus,
            target: self.target.as_deref(),
        };
        task.chat(&mut ctx, prompt).await
    }

    pub async fn step(&mut self) -> Option<anyhow::Result<String>> {
        let Some(task) = self.task.as_ref() else {
            self.console.print("❌ No context information found");
            return None;
        };
        let mut ctx = TaskContext {
            llm: self.llm.as_mut(),
            runner: &mut self.runner,
            console: self.console.as_ref(),
            bus: &self.bus,
            target: self.target.as_deref(),
        };
        task.step(&mut ctx).await
    }

    /// Close the open task: export it when a save directory is set, then
    /// reset the conversation and the execution context.
    pub fn done(&mut self) -> Result<Option<PathBuf>> {
        let Some(task) = self.task.take() else {
            return Ok(None);
        };
        let saved = match &self.save_dir {
            Some(dir) if !self.llm.is_empty() => task.save(dir, self.llm.as_ref(), &self.runner).map(Some),
            _ => Ok(None),
        };
        self.llm.clear();
        self.runner.clear();
        tracing::info!(task_id = %task.task_id, "task closed");
        saved
    }

    /// Reset the execution context only.
    pub fn clear(&mut self) {
        self.runner.clear();
    }
}
