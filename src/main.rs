mod cli;

use std::{
    io::{self, BufRead, Read, Write},
    sync::Arc,
};

use aipy::{
    config::Config,
    console::{Console, TermConsole},
    events::EventBus,
    execution::InterruptHandle,
    llm::Llm,
    printer::{Color, TextPrinter},
    role,
    task::TaskManager,
    telemetry,
};
use anyhow::Result;
use is_terminal::IsTerminal;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    telemetry::init(args.verbose)?;

    let mut cfg = match args.config.as_deref() {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if args.auto_install {
        cfg.set("AUTO_INSTALL", "true");
    }
    if args.auto_getenv {
        cfg.set("AUTO_GETENV", "true");
    }

    // stdin handling (pipe support)
    let stdin_is_tty = io::stdin().is_terminal();
    let mut prompt_from_stdin = String::new();
    if !stdin_is_tty {
        io::stdin().read_to_string(&mut prompt_from_stdin)?;
    }
    let arg_prompt = args.prompt.clone().unwrap_or_default();
    let prompt = match (prompt_from_stdin.trim().is_empty(), arg_prompt.trim().is_empty()) {
        (false, false) => format!("{}\n\n{}", prompt_from_stdin.trim(), arg_prompt),
        (false, true) => prompt_from_stdin.trim().to_string(),
        _ => arg_prompt,
    };

    let console: Arc<dyn Console> = Arc::new(TermConsole::new(args.quiet));
    let bus = Arc::new(EventBus::new());
    let llm = Llm::from_config(&cfg, args.model.clone(), console.clone())?;
    let model = llm.model().to_string();
    let system_prompt = role::resolve_system_prompt(&cfg)?;
    let save_dir = (!args.no_save).then(|| cfg.task_save_path());

    let mut manager = TaskManager::new(&cfg, console.clone(), bus.clone(), Box::new(llm))
        .with_system_prompt(system_prompt)
        .with_max_rounds(args.max_rounds)
        .with_save_dir(save_dir);
    spawn_interrupt_handler(manager.interrupt_handle(), bus.clone());

    if !prompt.trim().is_empty() {
        manager.run(&prompt).await;
        report_done(console.as_ref(), &mut manager);
        return Ok(());
    }
    if !stdin_is_tty {
        anyhow::bail!("Provide an instruction as argument or via stdin");
    }

    TextPrinter { color: Some(Color::Cyan) }.print(&format!(
        "🚀 aipy {} | model: {}",
        env!("CARGO_PKG_VERSION"),
        model
    ));
    TextPrinter { color: Some(Color::Dim) }
        .print("Commands: /done /chat <text> /step /clear /env /exit");
    while let Some(line) = read_instruction()? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("/exit", _) => break,
            ("/done", _) => report_done(console.as_ref(), &mut manager),
            ("/clear", _) => {
                manager.clear();
                console.print("🧹 Execution context cleared");
            }
            ("/env", _) => print_env(console.as_ref(), &manager),
            ("/step", _) => {
                if let Some(Err(e)) = manager.step().await {
                    console.print(&format!("❌ {e:#}"));
                }
            }
            ("/chat", text) if !text.is_empty() => {
                if let Err(e) = manager.chat(text).await {
                    console.print(&format!("❌ {e:#}"));
                }
            }
            ("/chat", _) => console.print("Usage: /chat <text>"),
            _ => {
                let report = manager.run(line).await;
                tracing::debug!(rounds = report.rounds, stop = ?report.stop, "instruction finished");
            }
        }
    }
    report_done(console.as_ref(), &mut manager);
    Ok(())
}

/// First Ctrl-C interrupts a running fragment, or asks the loop to stop when
/// nothing is executing; a second one while stopped exits.
fn spawn_interrupt_handler(interrupt: InterruptHandle, bus: Arc<EventBus>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt.interrupt() {
                tracing::info!("execution interrupted");
                continue;
            }
            if bus.is_stopped() {
                eprintln!();
                std::process::exit(130);
            }
            bus.request_stop();
            eprintln!("\n⏸ Stop requested; press Ctrl-C again to exit");
        }
    });
}

fn read_instruction() -> Result<Option<String>> {
    print!("{}", TextPrinter { color: Some(Color::Green) }.render(">> "));
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn report_done(console: &dyn Console, manager: &mut TaskManager) {
    match manager.done() {
        Ok(Some(path)) => console.print(&format!("💾 Task saved to {}", path.display())),
        Ok(None) => {}
        Err(e) => console.print(&format!("❌ Failed to save task: {e}")),
    }
}

fn print_env(console: &dyn Console, manager: &TaskManager) {
    let env = manager.runner().env();
    if env.is_empty() {
        console.print("(no stored values)");
        return;
    }
    for (name, entry) in env {
        console.print(&format!("{name}: {}", entry.desc.as_deref().unwrap_or("")));
    }
}
