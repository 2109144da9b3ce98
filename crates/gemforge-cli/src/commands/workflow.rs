//! `gemforge run|validate|gems|personas` — gem commands.

use std::future::Future;
use std::sync::Arc;

use console::style;
use gemforge_core::workflow::{
    builtin_gems, Attachment, Gem, GeminiAgentCaller, PersonaLibrary, RunStatus, StageResult,
    WorkflowRun, WorkflowRunner,
};
use tokio::sync::watch;

use super::env::load_dotenv;
use super::{load_personas, print_json, resolve_gem, truncate};

/// Run a gem against a prompt, printing stage progress as it happens.
/// Ctrl-C stops the run after the stage in flight settles; a second Ctrl-C
/// exits immediately with status 1.
pub async fn run(
    gem_ref: &str,
    prompt: &str,
    attach: Option<&str>,
    persona_dir: Option<&str>,
    verbose: bool,
    json: bool,
) -> Result<(), String> {
    // Load .env / .env.local if present (for the API key)
    load_dotenv();

    let gem = resolve_gem(gem_ref)?;
    let personas = load_personas(persona_dir)?;
    for problem in gem.lint(&personas) {
        eprintln!("{} {}", style("⚠").yellow(), problem);
    }

    let attachment = attach
        .map(Attachment::from_file)
        .transpose()
        .map_err(|e| e.to_string())?;
    let caller = GeminiAgentCaller::from_env().map_err(|e| e.to_string())?;
    let runner = Arc::new(WorkflowRunner::new(Arc::new(caller), personas));

    println!("📄 Loaded gem: {} ({})", gem.name, gem.id);
    println!(
        "   {} stage(s), {} agent(s)",
        gem.stages.len(),
        gem.agent_count()
    );
    if let Some(att) = &attachment {
        println!(
            "   Attachment: {} ({} bytes)",
            att.mime_type,
            att.size_bytes()
        );
    }
    println!();

    let progress = tokio::spawn(print_progress(runner.subscribe()));
    let interrupt = {
        let runner = runner.clone();
        tokio::spawn(async move {
            if handle_interrupts(&runner, tokio::signal::ctrl_c).await {
                eprintln!("\n⏹  Aborted");
                std::process::exit(1);
            }
        })
    };

    let result = runner.run(&gem, prompt, attachment).await;
    interrupt.abort();
    let _ = progress.await;

    let run = match result {
        Ok(run) => run,
        Err(e) => {
            if json {
                if let Some(run) = runner.snapshot() {
                    print_run_json(&run);
                }
            }
            return Err(e.to_string());
        }
    };

    if json {
        print_run_json(&run);
    }

    match run.status {
        RunStatus::Completed => {
            if verbose {
                println!();
                for (name, content) in run.artifacts.iter() {
                    println!("── {} ──", style(name).bold());
                    println!("{}", render_output(content));
                    println!();
                }
            }
            println!(
                "\n🎉 Workflow completed in {} ms\n",
                run.duration_ms().unwrap_or_default()
            );
            println!("{}", render_output(&run.final_output));
            Ok(())
        }
        RunStatus::Cancelled => Err("Workflow was cancelled".to_string()),
        status => Err(format!("Workflow ended with status '{}'", status)),
    }
}

/// Stop `runner` on the first interrupt, then wait for another one.
/// Returns `true` if the second interrupt arrives, meaning the caller should
/// give up on the in-flight agents and exit.
pub async fn handle_interrupts<S, F>(runner: &WorkflowRunner, mut signal: S) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if signal().await.is_err() {
        return false;
    }
    eprintln!("\n⏹  Stopping, waiting for in-flight agents to settle (press Ctrl-C again to quit)...");
    runner.stop();

    signal().await.is_ok()
}

/// Validate a gem file without executing it.
pub fn validate(gem_file: &str, persona_dir: Option<&str>) -> Result<(), String> {
    let gem = Gem::from_file(gem_file).map_err(|e| e.to_string())?;
    let personas = load_personas(persona_dir)?;

    println!("📄 Gem '{}' ({})", gem.name, gem.id);
    if !gem.description.is_empty() {
        println!("   {}", gem.description);
    }
    println!("   Stages: {}", gem.stages.len());

    for (i, stage) in gem.stages.iter().enumerate() {
        println!("   {}. {}", i + 1, stage.name);
        for agent in &stage.parallel_agents {
            println!(
                "      - {} [{}] → {}",
                agent.persona_ref, agent.model, agent.output_artifact_name
            );
        }
    }

    let problems = gem.lint(&personas);
    if problems.is_empty() {
        println!("\n✅ Gem '{}' is valid", gem.name);
        return Ok(());
    }

    println!();
    for problem in &problems {
        println!("{} {}", style("⚠").yellow(), problem);
    }
    Err(format!(
        "Gem '{}' has {} problem(s)",
        gem.name,
        problems.len()
    ))
}

/// List the built-in gems.
pub fn list_gems() -> Result<(), String> {
    let gems = builtin_gems();

    println!("┌──────────────────────┬──────────────────────────┬────────┬────────┐");
    println!("│ ID                   │ Name                     │ Stages │ Agents │");
    println!("├──────────────────────┼──────────────────────────┼────────┼────────┤");
    for gem in &gems {
        println!(
            "│ {:<20} │ {:<24} │ {:>6} │ {:>6} │",
            truncate(&gem.id, 20),
            truncate(&gem.name, 24),
            gem.stages.len(),
            gem.agent_count()
        );
    }
    println!("└──────────────────────┴──────────────────────────┴────────┴────────┘");
    Ok(())
}

/// List available personas: built-ins plus anything loaded from disk.
pub fn list_personas(persona_dir: Option<&str>) -> Result<(), String> {
    let personas = load_personas(persona_dir)?;
    let builtins: PersonaLibrary = PersonaLibrary::builtin_personas().into_iter().collect();

    println!("┌────────────────────────┬──────────────────────────┬──────────┐");
    println!("│ ID                     │ Name                     │ Source   │");
    println!("├────────────────────────┼──────────────────────────┼──────────┤");
    for persona in personas.all() {
        let source = match builtins.get(&persona.id) {
            Some(builtin) if builtin == persona => "builtin",
            _ => "file",
        };
        println!(
            "│ {:<22} │ {:<24} │ {:<8} │",
            truncate(&persona.id, 22),
            truncate(&persona.name, 24),
            source
        );
    }
    println!("└────────────────────────┴──────────────────────────┴──────────┘");
    Ok(())
}

/// Follow run snapshots until the run reaches a terminal state.
async fn print_progress(mut rx: watch::Receiver<Option<WorkflowRun>>) {
    let mut printer = ProgressPrinter::default();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        let Some(run) = snapshot else { continue };
        for line in printer.update(&run) {
            println!("{}", line);
        }
        if !run.is_running() {
            break;
        }
    }
}

/// Turns successive run snapshots into one line per stage transition.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    seen: Vec<RunStatus>,
}

impl ProgressPrinter {
    pub fn update(&mut self, run: &WorkflowRun) -> Vec<String> {
        let mut lines = Vec::new();
        for (index, stage) in run.stage_results.iter().enumerate() {
            let previous = self.seen.get(index).copied();
            if previous == Some(stage.status) {
                continue;
            }
            // Snapshots coalesce, so a stage can appear already finished
            if previous.is_none() && stage.status != RunStatus::Running {
                lines.push(stage_line(index, stage, RunStatus::Running));
            }
            lines.push(stage_line(index, stage, stage.status));

            if previous.is_none() {
                self.seen.push(stage.status);
            } else {
                self.seen[index] = stage.status;
            }
        }
        lines
    }
}

fn stage_line(index: usize, stage: &StageResult, status: RunStatus) -> String {
    let duration = stage
        .duration_ms()
        .map(|ms| format!(" ({} ms)", ms))
        .unwrap_or_default();
    match status {
        RunStatus::Running => format!("▶ Stage {}: {}", index + 1, stage.name),
        RunStatus::Completed => format!(
            "✓ Stage {}: {} — {} agent(s){}",
            index + 1,
            stage.name,
            stage.agent_results.len(),
            duration
        ),
        RunStatus::Failed => format!("✗ Stage {}: {} failed{}", index + 1, stage.name, duration),
        RunStatus::Cancelled => format!("⏹ Stage {}: {} cancelled", index + 1, stage.name),
    }
}

/// Inline images are shown as a short marker instead of raw base64.
pub fn render_output(output: &str) -> String {
    match output
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
    {
        Some((mime, data)) => format!("[{} image, {} base64 chars]", mime, data.len()),
        None => output.to_string(),
    }
}

fn print_run_json(run: &WorkflowRun) {
    match serde_json::to_value(run) {
        Ok(value) => print_json(&value),
        Err(e) => eprintln!("Failed to serialize run: {}", e),
    }
}
