mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use aipy::{
    config::Config,
    events::{Event, EventBus},
    task::{StopReason, Task, TaskContext, TaskManager},
};
use anyhow::Result;
use common::{main_block, runner, ScriptedConsole, ScriptedGenerator};

#[tokio::test]
async fn reply_without_blocks_ends_the_loop() {
    let console = ScriptedConsole::default();
    let bus = EventBus::new();
    let mut llm = ScriptedGenerator::new(&["Nothing to run, the answer is 42."]);
    let sent = llm.sent_log();
    let mut runner = runner();

    let task = Task::new("what is the answer");
    let mut ctx = TaskContext { llm: &mut llm, runner: &mut runner, console: &console, bus: &bus, target: None };
    let report = task.run(&mut ctx, None, None).await;

    assert_eq!(report.rounds, 0);
    assert_eq!(report.stop, StopReason::NoMain);
    assert_eq!(runner.history().len(), 1);
    assert_eq!(sent.lock().unwrap().len(), 1);
    assert!(console.printed().contains("End of instruction"));
}

#[tokio::test]
async fn round_budget_of_one_executes_exactly_once() {
    let console = ScriptedConsole::default();
    let bus = EventBus::new();
    let mut llm = ScriptedGenerator::repeating(&main_block("print(\"tick\");"));
    let sent = llm.sent_log();
    let mut runner = runner();

    let task = Task::new("tick forever").with_max_rounds(Some(1));
    let mut ctx = TaskContext { llm: &mut llm, runner: &mut runner, console: &console, bus: &bus, target: None };
    let report = task.run(&mut ctx, None, None).await;

    assert_eq!(report.rounds, 1);
    assert_eq!(report.stop, StopReason::RoundLimit);
    assert_eq!(runner.history().len(), 2);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].prompt.starts_with("# Initial mission\ntick forever\n\n# Code execution result feedback\n"));
    assert!(sent[1].prompt.contains("\"stdout\": \"tick\""));
    assert_eq!(sent[1].system_prompt, None);
}

#[tokio::test]
async fn initial_prompt_is_json_with_system_prompt() -> Result<()> {
    let console = ScriptedConsole::default();
    let bus = EventBus::new();
    let starts = Arc::new(AtomicUsize::new(0));
    let seen = starts.clone();
    bus.subscribe(move |event| {
        if let Event::TaskStart(payload) = event {
            assert_eq!(payload["task"], "list files");
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });
    let mut llm = ScriptedGenerator::new(&["done"]);
    let sent = llm.sent_log();
    let mut runner = runner();

    let task = Task::new("list files").with_system_prompt(Some("SYSTEM".into()));
    let mut ctx = TaskContext { llm: &mut llm, runner: &mut runner, console: &console, bus: &bus, target: None };
    task.run(&mut ctx, None, None).await;

    let first = sent.lock().unwrap()[0].clone();
    let payload: serde_json::Value = serde_json::from_str(&first.prompt)?;
    assert_eq!(payload["task"], "list files");
    assert!(payload["today"].is_string());
    assert!(payload.get("display").is_some());
    assert_eq!(first.system_prompt.as_deref(), Some("SYSTEM"));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn empty_reply_and_generator_failure_stop_the_loop() {
    let console = ScriptedConsole::default();
    let bus = EventBus::new();
    let mut runner = runner();
    let task = Task::new("anything");

    let mut llm = ScriptedGenerator::new(&[main_block("print(1);").as_str()]);
    let mut ctx = TaskContext { llm: &mut llm, runner: &mut runner, console: &console, bus: &bus, target: None };
    let report = task.run(&mut ctx, None, None).await;
    assert_eq!(report.stop, StopReason::EmptyReply);
    assert_eq!(report.rounds, 1);

    let mut llm = ScriptedGenerator::failing("connection refused");
    let mut ctx = TaskContext { llm: &mut llm, runner: &mut runner, console: &console, bus: &bus, target: None };
    let report = task.run(&mut ctx, None, None).await;
    assert_eq!(report.stop, StopReason::GeneratorFailed);
    assert!(console.printed().contains("connection refused"));
}

#[tokio::test]
async fn stop_request_ends_after_current_round() {
    let console = ScriptedConsole::default();
    let bus = Arc::new(EventBus::new());
    let weak = Arc::downgrade(&bus);
    let results = Arc::new(AtomicUsize::new(0));
    let counted = results.clone();
    bus.subscribe(move |event| {
        if let Event::Result(_) = event {
            counted.fetch_add(1, Ordering::SeqCst);
            if let Some(bus) = weak.upgrade() {
                bus.request_stop();
            }
        }
    });
    let mut llm = ScriptedGenerator::repeating(&main_block("print(\"again\");"));
    let mut runner = runner();

    let task = Task::new("loop");
    let mut ctx = TaskContext { llm: &mut llm, runner: &mut runner, console: &console, bus: &bus, target: None };
    let report = task.run(&mut ctx, None, None).await;

    assert_eq!(report.stop, StopReason::Stopped);
    assert_eq!(report.rounds, 1);
    assert_eq!(results.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn faults_are_fed_back_not_raised() {
    let console = ScriptedConsole::default();
    let bus = EventBus::new();
    let mut llm = ScriptedGenerator::new(&[main_block("throw \"boom\";").as_str(), "I see the error."]);
    let sent = llm.sent_log();
    let mut runner = runner();

    let task = Task::new("fail once");
    let mut ctx = TaskContext { llm: &mut llm, runner: &mut runner, console: &console, bus: &bus, target: None };
    let report = task.run(&mut ctx, None, None).await;

    assert_eq!(report.rounds, 1);
    assert_eq!(report.stop, StopReason::NoMain);
    assert!(sent.lock().unwrap()[1].prompt.contains("\"errstr\": \"boom\""));
}

fn manager(llm: ScriptedGenerator, dir: &std::path::Path) -> TaskManager {
    let cfg = Config::from_pairs([
        ("TASK_SAVE_PATH", dir.display().to_string()),
        ("AIPY_ENV_REGION", "eu".to_string()),
    ]);
    TaskManager::new(
        &cfg,
        Arc::new(ScriptedConsole::default()),
        Arc::new(EventBus::new()),
        Box::new(llm),
    )
    .with_system_prompt("SYSTEM")
}

#[tokio::test]
async fn follow_up_is_sent_verbatim_and_done_exports() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let llm = ScriptedGenerator::new(&[
        main_block("__session__.n = 1; declare_result(__env__.REGION);").as_str(),
        "Region is eu.",
        "Nothing else to do.",
    ]);
    let sent = llm.sent_log();
    let mut manager = manager(llm, dir.path());

    manager.run("Which region?").await;
    assert_eq!(manager.runner().history().len(), 2);
    manager.run("Thanks").await;

    {
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].system_prompt.as_deref(), Some("SYSTEM"));
        assert!(sent[1].prompt.contains("\"__result__\": \"eu\""));
        assert_eq!(sent[2].prompt, "Thanks");
        assert_eq!(sent[2].system_prompt, None);
    }

    let path = manager.done()?.expect("task should be saved");
    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("Which_region.json"));
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(saved["instruction"], "Which region?");
    assert_eq!(saved["llm"].as_array().map(Vec::len), Some(7));
    assert_eq!(saved["runner"].as_array().map(Vec::len), Some(2));

    assert!(manager.task().is_none());
    assert_eq!(manager.runner().history().len(), 1);
    assert_eq!(manager.runner().env()["REGION"].value, "eu");
    Ok(())
}

#[tokio::test]
async fn step_replays_the_last_reply() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let llm = ScriptedGenerator::new(&[
        main_block("__session__.n = 1;").as_str(),
        main_block("__session__.n += 1;").as_str(),
        "ok",
    ]);
    let mut manager = manager(llm, dir.path()).with_max_rounds(Some(1));

    let report = manager.run("count").await;
    assert_eq!(report.stop, StopReason::RoundLimit);
    assert_eq!(manager.runner().session()["n"], 1);

    let reply = manager.step().await.expect("last reply has a main block")?;
    assert_eq!(reply, "ok");
    assert_eq!(manager.runner().session()["n"], 2);
    assert!(manager.step().await.is_none());
    Ok(())
}

#[tokio::test]
async fn chat_sends_system_prompt_only_on_empty_conversation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let llm = ScriptedGenerator::new(&["hi", "fine"]);
    let sent = llm.sent_log();
    let mut manager = manager(llm, dir.path()).with_save_dir(None);

    assert_eq!(manager.chat("hello").await?, "hi");
    assert_eq!(manager.chat("how are you").await?, "fine");
    let sent = sent.lock().unwrap().clone();
    assert_eq!(sent[0].system_prompt.as_deref(), Some("SYSTEM"));
    assert_eq!(sent[1].system_prompt, None);

    assert_eq!(manager.done()?, None);
    Ok(())
}
