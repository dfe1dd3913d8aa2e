//! Runtime handle exposed to fragments as `runtime` and as free functions.

use std::sync::{Arc, Mutex, MutexGuard};

use rhai::{Array, Dynamic, Engine, ImmutableString, Map as RhaiMap, INT};

use super::{
    capture::{OutputSink, Stream},
    packages::Installer,
    EnvEntry, EnvMap,
};
use crate::{
    console::Console,
    events::{Event, EventBus},
    utils::command::run_captured,
};

struct Shared {
    console: Arc<dyn Console>,
    bus: Arc<EventBus>,
    sink: OutputSink,
    installer: Installer,
    auto_install: bool,
    auto_getenv: bool,
    env: Mutex<EnvMap>,
    declared: Mutex<Option<Dynamic>>,
}

#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("env", &self.env().len())
            .finish()
    }
}

pub(crate) struct RuntimeOptions {
    pub console: Arc<dyn Console>,
    pub bus: Arc<EventBus>,
    pub sink: OutputSink,
    pub installer: Installer,
    pub auto_install: bool,
    pub auto_getenv: bool,
    pub env: EnvMap,
}

impl Runtime {
    pub(crate) fn new(opts: RuntimeOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                console: opts.console,
                bus: opts.bus,
                sink: opts.sink,
                installer: opts.installer,
                auto_install: opts.auto_install,
                auto_getenv: opts.auto_getenv,
                env: Mutex::new(opts.env),
                declared: Mutex::new(None),
            }),
        }
    }

    fn env(&self) -> MutexGuard<'_, EnvMap> {
        self.shared.env.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn env_snapshot(&self) -> EnvMap {
        self.env().clone()
    }

    pub fn setenv(&self, name: &str, value: &str, desc: Option<&str>) {
        self.env().insert(
            name.to_string(),
            EnvEntry { value: value.to_string(), desc: desc.map(str::to_string) },
        );
    }

    /// Look up `name` in the environment map, asking the user for it when
    /// absent (or returning nothing when auto-getenv is on). A non-empty
    /// answer is stored back with its description.
    pub fn getenv(&self, name: &str, default: Option<&str>, desc: Option<&str>) -> Option<String> {
        let console = &self.shared.console;
        console.print(&format!(
            "\n⚠️ LLM asks for environment variable {name}: {}",
            desc.unwrap_or("")
        ));
        let existing = self.env().get(name).map(|e| e.value.clone());
        let value = match existing {
            Some(v) => {
                console.print(&format!("✅ Environment variable {name} exists"));
                Some(v)
            }
            None => {
                let v = if self.shared.auto_getenv {
                    console.print("✅ Auto confirm");
                    None
                } else {
                    Some(console.input(&format!("💬 Please enter the value for {name}: ")).trim().to_string())
                };
                if let Some(v) = v.as_deref().filter(|v| !v.is_empty()) {
                    self.setenv(name, v, desc);
                    tracing::info!(name, "environment value provided");
                }
                v
            }
        };
        value
            .filter(|v| !v.is_empty())
            .or_else(|| default.map(str::to_string))
    }

    /// `Some(true)` when everything is (now) available, `Some(false)` when
    /// installation failed, `None` when the user declined.
    pub fn request_packages(&self, names: &[String]) -> Option<bool> {
        let console = &self.shared.console;
        console.print(&format!("\n⚠️ LLM asks for packages: {names:?}"));
        let (_, missing) = self.shared.installer.partition(names);
        if missing.is_empty() {
            console.print("✅ Packages already installed");
            return Some(true);
        }
        let ok = console.confirm(
            &format!("💬 Agree to install {missing:?}? (y/n)> "),
            self.shared.auto_install,
        );
        if !ok {
            tracing::info!(packages = ?missing, "package install declined");
            return None;
        }
        match self.shared.installer.install(&missing) {
            Ok(done) => Some(done),
            Err(e) => {
                console.print(&format!("❌ {e}"));
                tracing::warn!(error = %e, "package install failed");
                Some(false)
            }
        }
    }

    pub fn display(&self, path: Option<&str>, url: Option<&str>) {
        self.shared.bus.broadcast(Event::Display { path, url });
        let console = &self.shared.console;
        if !console.is_quiet() {
            console.display_image(path, url);
        }
    }

    pub fn input(&self, prompt: &str) -> String {
        self.shared.console.input(prompt)
    }

    pub fn declare_result(&self, value: Dynamic) {
        *self.declared() = Some(value);
    }

    pub(crate) fn take_declared(&self) -> Option<Dynamic> {
        self.declared().take()
    }

    fn declared(&self) -> MutexGuard<'_, Option<Dynamic>> {
        self.shared.declared.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run a host command; its raw output goes to the (possibly captured)
    /// process streams.
    pub fn shell(&self, cmd: &str) -> INT {
        match run_captured(cmd) {
            Ok(out) => {
                self.shared.sink.write(Stream::Stdout, &out.stdout);
                self.shared.sink.write(Stream::Stderr, &out.stderr);
                out.status.code().map(INT::from).unwrap_or(-1)
            }
            Err(e) => {
                self.shared.sink.write_line(Stream::Stderr, &e.to_string());
                -1
            }
        }
    }

    pub fn shell_output(&self, cmd: &str) -> RhaiMap {
        let mut map = RhaiMap::new();
        match run_captured(cmd) {
            Ok(out) => {
                map.insert("code".into(), Dynamic::from(out.status.code().map(INT::from).unwrap_or(-1)));
                map.insert("stdout".into(), String::from_utf8_lossy(&out.stdout).into_owned().into());
                map.insert("stderr".into(), String::from_utf8_lossy(&out.stderr).into_owned().into());
            }
            Err(e) => {
                map.insert("code".into(), Dynamic::from(-1 as INT));
                map.insert("stdout".into(), "".into());
                map.insert("stderr".into(), e.to_string().into());
            }
        }
        map
    }

    /// Register the `Runtime` type with its methods, plus free-function
    /// aliases bound to this handle.
    pub(crate) fn register(&self, engine: &mut Engine) {
        engine.register_type_with_name::<Runtime>("Runtime");

        engine.register_fn("declare_result", |rt: &mut Runtime, v: Dynamic| rt.declare_result(v));
        engine.register_fn("getenv", |rt: &mut Runtime, name: &str| getenv_dyn(rt, name, None, None));
        engine.register_fn("getenv", |rt: &mut Runtime, name: &str, default: Dynamic| {
            getenv_dyn(rt, name, Some(default), None)
        });
        engine.register_fn("getenv", |rt: &mut Runtime, name: &str, default: Dynamic, desc: &str| {
            getenv_dyn(rt, name, Some(default), Some(desc))
        });
        engine.register_fn("setenv", |rt: &mut Runtime, name: &str, value: &str, desc: &str| {
            rt.setenv(name, value, Some(desc))
        });
        engine.register_fn("install_packages", |rt: &mut Runtime, names: Array| packages_dyn(rt, names));
        engine.register_fn("request_packages", |rt: &mut Runtime, names: Array| packages_dyn(rt, names));
        engine.register_fn("display", |rt: &mut Runtime, path: &str| rt.display(Some(path), None));
        engine.register_fn("display_url", |rt: &mut Runtime, url: &str| rt.display(None, Some(url)));
        engine.register_fn("input", |rt: &mut Runtime, prompt: &str| rt.input(prompt));
        engine.register_fn("shell", |rt: &mut Runtime, cmd: &str| rt.shell(cmd));
        engine.register_fn("shell_output", |rt: &mut Runtime, cmd: &str| rt.shell_output(cmd));

        let rt = self.clone();
        engine.register_fn("declare_result", move |v: Dynamic| rt.declare_result(v));
        let rt = self.clone();
        engine.register_fn("getenv", move |name: &str| getenv_dyn(&rt, name, None, None));
        let rt = self.clone();
        engine.register_fn("getenv", move |name: &str, default: Dynamic| {
            getenv_dyn(&rt, name, Some(default), None)
        });
        let rt = self.clone();
        engine.register_fn("getenv", move |name: &str, default: Dynamic, desc: &str| {
            getenv_dyn(&rt, name, Some(default), Some(desc))
        });
        let rt = self.clone();
        engine.register_fn("setenv", move |name: &str, value: &str, desc: &str| {
            rt.setenv(name, value, Some(desc))
        });
        let rt = self.clone();
        engine.register_fn("install_packages", move |names: Array| packages_dyn(&rt, names));
        let rt = self.clone();
        engine.register_fn("request_packages", move |names: Array| packages_dyn(&rt, names));
        let rt = self.clone();
        engine.register_fn("display", move |path: &str| rt.display(Some(path), None));
        let rt = self.clone();
        engine.register_fn("display_url", move |url: &str| rt.display(None, Some(url)));
        let rt = self.clone();
        engine.register_fn("input", move |prompt: &str| rt.input(prompt));
        let rt = self.clone();
        engine.register_fn("shell", move |cmd: &str| rt.shell(cmd));
        let rt = self.clone();
        engine.register_fn("shell_output", move |cmd: &str| rt.shell_output(cmd));
        let sink = self.shared.sink.clone();
        engine.register_fn("eprint", move |text: &str| sink.write_line(Stream::Stderr, text));
    }
}

fn getenv_dyn(rt: &Runtime, name: &str, default: Option<Dynamic>, desc: Option<&str>) -> Dynamic {
    let default = default.filter(|d| !d.is_unit()).map(|d| d.to_string());
    match rt.getenv(name, default.as_deref(), desc) {
        Some(v) => ImmutableString::from(v).into(),
        None => Dynamic::UNIT,
    }
}

fn packages_dyn(rt: &Runtime, names: Array) -> Dynamic {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    match rt.request_packages(&names) {
        Some(ok) => Dynamic::from(ok),
        None => Dynamic::UNIT,
    }
}
