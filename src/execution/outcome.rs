//! Classification of one fragment run.

use rhai::{Dynamic, Engine, EvalAltResult, Position};

/// Fault text raised by `exit()`; `exit(code)` appends `: <code>`.
pub const EXIT_FAULT: &str = "SystemExit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Faulted { errstr: String, traceback: String },
    Interrupted,
}

impl Outcome {
    pub fn classify(res: Result<(), Box<EvalAltResult>>, code: &str) -> Self {
        match res {
            Ok(()) => Outcome::Completed,
            Err(err) => match *err {
                EvalAltResult::ErrorTerminated(..) => Outcome::Interrupted,
                ref e => Outcome::Faulted { errstr: errstr(e), traceback: traceback(e, code) },
            },
        }
    }
}

/// Make `exit()` and `exit(code)` abort the fragment as a fault. The engine's
/// own `exit` ends a run as if it had completed.
pub(crate) fn register_exit(engine: &mut Engine) {
    engine.register_fn("exit", || -> Result<(), Box<EvalAltResult>> { Err(exit_fault(None)) });
    engine.register_fn("exit", |code: Dynamic| -> Result<(), Box<EvalAltResult>> {
        Err(exit_fault(Some(code)))
    });
}

fn exit_fault(code: Option<Dynamic>) -> Box<EvalAltResult> {
    let message = match code {
        Some(code) if !code.is_unit() => format!("{EXIT_FAULT}: {code}"),
        _ => EXIT_FAULT.to_string(),
    };
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

/// The thrown value for `throw`, otherwise the innermost error's message.
fn errstr(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => errstr(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => errstr(inner),
        EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
        other => other.to_string(),
    }
}

fn traceback(err: &EvalAltResult, code: &str) -> String {
    let mut out = vec!["Traceback (most recent call last):".to_string()];
    let mut frame = err;
    let mut func: Option<&str> = None;
    loop {
        let location = describe(frame.position(), func);
        out.push(format!("  {location}"));
        if let Some(src) = source_line(code, frame.position()) {
            out.push(format!("    {src}"));
        }
        match frame {
            EvalAltResult::ErrorInFunctionCall(name, _, inner, _) => {
                func = Some(name.as_str());
                frame = inner.as_ref();
            }
            EvalAltResult::ErrorInModule(_, inner, _) => frame = inner.as_ref(),
            _ => break,
        }
    }
    out.push(frame.to_string());
    out.join("\n")
}

fn describe(pos: Position, func: Option<&str>) -> String {
    let at = match (pos.line(), pos.position()) {
        (Some(line), Some(col)) => format!("line {line}, column {col}"),
        (Some(line), None) => format!("line {line}"),
        _ => "<unknown position>".to_string(),
    };
    match func {
        Some(name) => format!("{at}, in {name}"),
        None => format!("{at}, in <main>"),
    }
}

fn source_line(code: &str, pos: Position) -> Option<&str> {
    let line = pos.line()?;
    code.lines()
        .nth(line.checked_sub(1)?)
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> Outcome {
        let engine = Engine::new();
        Outcome::classify(engine.run(code), code)
    }

    #[test]
    fn throw_reports_thrown_value() {
        match run("let x = 1;\nthrow \"boom\";") {
            Outcome::Faulted { errstr, traceback } => {
                assert_eq!(errstr, "boom");
                assert!(traceback.starts_with("Traceback"));
                assert!(traceback.contains("line 2"));
                assert!(traceback.contains("throw \"boom\";"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_calls_list_every_frame() {
        let code = "fn inner() { throw \"deep\"; }\nfn outer() { inner() }\nouter();";
        match run(code) {
            Outcome::Faulted { errstr, traceback } => {
                assert_eq!(errstr, "deep");
                assert!(traceback.contains("in outer"), "{traceback}");
                assert!(traceback.contains("in inner"), "{traceback}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_errors_are_faults() {
        assert!(matches!(run("let = ;"), Outcome::Faulted { .. }));
    }

    #[test]
    fn exit_is_a_fault_not_a_completion() {
        let mut engine = Engine::new();
        register_exit(&mut engine);
        let code = "let x = 1;\nexit(3);\nx += 1;";
        match Outcome::classify(engine.run(code), code) {
            Outcome::Faulted { errstr, traceback } => {
                assert_eq!(errstr, "SystemExit: 3");
                assert!(traceback.contains("SystemExit: 3"), "{traceback}");
            }
            other => panic!("unexpected {other:?}"),
        }
        let code = "exit();";
        assert!(matches!(
            Outcome::classify(engine.run(code), code),
            Outcome::Faulted { errstr, .. } if errstr == EXIT_FAULT
        ));
    }

    #[test]
    fn termination_is_interruption() {
        let mut engine = Engine::new();
        engine.on_progress(|_| Some(Dynamic::UNIT));
        let code = "loop { }";
        assert_eq!(Outcome::classify(engine.run(code), code), Outcome::Interrupted);
    }
}
