//! Persistent execution context.
//!
//! The engine and runtime handle live for the whole runner; every `execute`
//! call gets a fresh [`Scope`] built from the context state, and whatever the
//! fragment changed is observed by diffing snapshots afterwards.

use std::{path::PathBuf, sync::Arc};

use rhai::{Dynamic, Engine, ImmutableString, Map as RhaiMap, Scope};
use serde_json::Value;

use super::{
    capture::OutputSink,
    interrupt::InterruptHandle,
    outcome::Outcome,
    packages::Installer,
    qpy::{self, QpyTarget},
    runtime::{Runtime, RuntimeOptions},
    value, CodeBlocks, EnvEntry, EnvMap, HistoryEntry, StructuredResult, FILTERED_STREAM,
    MSG_INTERRUPTED, MSG_SUCCESS,
};
use crate::{config::Config, console::Console, events::EventBus};

#[derive(Debug, Clone, Default)]
pub struct RunnerSettings {
    pub auto_install: bool,
    pub auto_getenv: bool,
    pub install_command: Option<String>,
    pub qpy_tmp: Option<PathBuf>,
    pub qpy_launcher: Option<String>,
}

impl RunnerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            auto_install: cfg.get_bool("AUTO_INSTALL"),
            auto_getenv: cfg.get_bool("AUTO_GETENV"),
            install_command: cfg.get("INSTALL_COMMAND"),
            qpy_tmp: cfg.get_path("QPY_TMP"),
            qpy_launcher: cfg.get("QPY_LAUNCHER"),
        }
    }
}

/// Bindings that survive between executions and are reset by `clear`.
#[derive(Debug, Default)]
struct ContextState {
    session: RhaiMap,
    history: Vec<HistoryEntry>,
}

pub struct Runner {
    engine: Engine,
    runtime: Runtime,
    state: ContextState,
    sink: OutputSink,
    interrupt: InterruptHandle,
    qpy: QpyTarget,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Runner history={}, env={}>",
            self.state.history.len(),
            self.runtime.env_snapshot().len()
        )
    }
}

impl Runner {
    pub fn new(
        settings: RunnerSettings,
        console: Arc<dyn Console>,
        bus: Arc<EventBus>,
        envs: impl IntoIterator<Item = (String, EnvEntry)>,
    ) -> Self {
        let sink = OutputSink::new();
        let interrupt = InterruptHandle::new();
        let runtime = Runtime::new(RuntimeOptions {
            console,
            bus,
            sink: sink.clone(),
            installer: Installer::new(settings.install_command.clone()),
            auto_install: settings.auto_install,
            auto_getenv: settings.auto_getenv,
            env: envs.into_iter().collect(),
        });

        let mut engine = Engine::new();
        let out = sink.clone();
        engine.on_print(move |s| out.write_line(super::capture::Stream::Stdout, s));
        let err = sink.clone();
        engine.on_debug(move |s, _src, _pos| err.write_line(super::capture::Stream::Stderr, s));
        let flag = interrupt.clone();
        engine.on_progress(move |_ops| flag.is_requested().then_some(Dynamic::UNIT));
        runtime.register(&mut engine);
        super::outcome::register_exit(&mut engine);

        let mut runner = Self {
            engine,
            runtime,
            state: ContextState::default(),
            sink,
            interrupt,
            qpy: QpyTarget::new(settings.qpy_tmp, settings.qpy_launcher),
        };
        runner.clear();
        runner
    }

    /// Reset session bindings and history. The environment map is kept.
    pub fn clear(&mut self) {
        self.state.session = RhaiMap::new();
        self.state.history = vec![HistoryEntry::Initial { env: self.runtime.env_snapshot() }];
        tracing::debug!("runner cleared");
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.state.history
    }

    pub fn env(&self) -> EnvMap {
        self.runtime.env_snapshot()
    }

    pub fn setenv(&self, name: &str, value: &str, desc: Option<&str>) {
        self.runtime.setenv(name, value, desc);
    }

    pub fn session(&self) -> serde_json::Map<String, Value> {
        value::map_to_json(&self.state.session)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    pub fn request_secret(&self, name: &str, default: Option<&str>, desc: Option<&str>) -> Option<String> {
        self.runtime.getenv(name, default, desc)
    }

    pub fn request_packages(&self, names: &[String]) -> Option<bool> {
        self.runtime.request_packages(names)
    }

    fn scope(&self, blocks: &CodeBlocks, env: &EnvMap) -> Scope<'static> {
        let mut scope = Scope::new();
        scope.push("runtime", self.runtime.clone());
        scope.push("__session__", self.state.session.clone());
        scope.push("__result__", RhaiMap::new());

        let mut code_blocks = RhaiMap::new();
        for (name, src) in blocks {
            code_blocks.insert(name.as_str().into(), ImmutableString::from(src.as_str()).into());
        }
        scope.push_constant("__code_blocks__", code_blocks);

        let mut env_view = RhaiMap::new();
        for (name, entry) in env {
            env_view.insert(name.as_str().into(), ImmutableString::from(entry.value.as_str()).into());
        }
        scope.push_constant("__env__", env_view);

        let history = rhai::serde::to_dynamic(&self.state.history).unwrap_or(Dynamic::UNIT);
        scope.push_constant_dynamic("__history__", history);
        scope
    }

    fn run_fragment(&self, code: &str, scope: &mut Scope<'static>) -> Result<(), Box<rhai::EvalAltResult>> {
        if !qpy::is_webapp(code) {
            return self.engine.run_with_scope(scope, code);
        }
        match self.qpy.exec(code) {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "QPython launch failed, running locally");
                self.engine.run_with_scope(scope, &qpy::local_source(code))
            }
        }
    }

    /// Run `code` against the persistent context and report what happened.
    /// Never fails: faults and interruptions become part of the result.
    pub fn execute(&mut self, code: &str, blocks: &CodeBlocks) -> StructuredResult {
        let env_before = self.runtime.env_snapshot();
        let session_before = value::map_to_json(&self.state.session);
        let mut scope = self.scope(blocks, &env_before);
        self.runtime.take_declared();

        let (outcome, captured) = {
            let running = self.interrupt.begin();
            let capture = self.sink.capture();
            let res = self.run_fragment(code, &mut scope);
            let captured = capture.finish();
            drop(running);
            (Outcome::classify(res, code), captured)
        };

        let declared = self
            .runtime
            .take_declared()
            .or_else(|| scope.get_value::<Dynamic>("__result__"));
        let env_after = self.runtime.env_snapshot();
        let declared = declared
            .map(|v| value::sanitize(&v, &env_after))
            .filter(|v| !value::is_empty(v));

        let mut result = StructuredResult::default();
        match outcome {
            Outcome::Interrupted => result.message = Some(MSG_INTERRUPTED.into()),
            Outcome::Faulted { errstr, traceback } => {
                tracing::debug!(%errstr, "fragment faulted");
                result.errstr = Some(errstr);
                result.traceback = Some(traceback);
            }
            Outcome::Completed if declared.is_none() => result.message = Some(MSG_SUCCESS.into()),
            Outcome::Completed => {}
        }
        result.stdout = stream_text(&captured.stdout);
        result.stderr = stream_text(&captured.stderr);
        result.result = declared;

        if let Some(session) = scope.get_value::<RhaiMap>("__session__") {
            self.state.session = session;
        }
        let env_diff = value::diff(&value::env_to_json(&env_after), &value::env_to_json(&env_before));
        let session_diff = value::diff(&value::map_to_json(&self.state.session), &session_before);
        self.state.history.push(HistoryEntry::Execution {
            code: code.to_string(),
            result: result.clone(),
            env: (!env_diff.is_empty()).then_some(env_diff),
            session: (!session_diff.is_empty()).then_some(session_diff),
        });
        tracing::info!(history = self.state.history.len(), "fragment executed");
        result
    }
}

/// Trimmed stream text, `None` when empty, a marker when the bytes are not
/// valid UTF-8.
fn stream_text(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Err(_) => {
            let lossy = String::from_utf8_lossy(bytes);
            (!lossy.trim().is_empty()).then(|| FILTERED_STREAM.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_text_trims_and_filters() {
        assert_eq!(stream_text(b"  hi \n"), Some("hi".into()));
        assert_eq!(stream_text(b" \n\t"), None);
        assert_eq!(stream_text(b""), None);
        assert_eq!(stream_text(&[0xff, 0xfe, b'a']), Some(FILTERED_STREAM.into()));
    }
}
