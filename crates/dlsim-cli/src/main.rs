//! dlsim - Deadlock Detection & Recovery Simulator
//!
//! Runs declarative deadlock scenarios with configurable prevention and
//! recovery policies, prints per-step progress, and can export the full
//! snapshot history as JSON.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use dlsim_core::dispatcher::EventDispatcher;
use dlsim_core::graph::analyze_deadlock;
use dlsim_core::policies::{PreventionStrategy, RecoveryStrategy};
use dlsim_core::scenario::{simple_circular_scenario, Scenario};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dlsim")]
#[command(version)]
#[command(about = "Deadlock detection and recovery simulator")]
#[command(long_about = "
Deadlock Detection & Recovery Simulator

Executes a scenario of allocation, request, and release events against a
model of processes competing for multi-unit resources. An optional
prevention policy screens requests, deadlock is detected after every
event, and an optional recovery policy breaks deadlocks that occur.

Examples:

  # Run a scenario file
  dlsim --scenario scenarios/circular_wait.json

  # Step through a scenario with Banker's algorithm
  dlsim -s scenarios/banker_safe.yaml --step --policy bankers

  # Run with a recovery policy and export the snapshots
  dlsim -s scenarios/ring.json -r preempt_low_priority -e out.json

  # Generate and run a built-in circular-wait scenario
  dlsim --simple --verbose
")]
struct Cli {
    /// Path to scenario file (JSON or YAML)
    #[arg(short = 's', long = "scenario")]
    scenario: Option<PathBuf>,

    /// Simulation mode
    #[arg(short = 'm', long = "mode", value_enum, default_value = "continuous")]
    mode: ModeArg,

    /// Speed multiplier for realtime mode
    #[arg(long = "speed", default_value_t = 1.0)]
    speed: f64,

    /// Override the scenario's prevention policy
    #[arg(short = 'p', long = "policy", value_enum)]
    policy: Option<PolicyArg>,

    /// Override the scenario's recovery policy
    #[arg(short = 'r', long = "recovery", value_enum)]
    recovery: Option<RecoveryArg>,

    /// Step through events one at a time (same as --mode step)
    #[arg(long = "step")]
    step_mode: bool,

    /// Export snapshots to a JSON file
    #[arg(short = 'e', long = "export")]
    export: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Run a generated circular-wait scenario instead of loading a file
    #[arg(long = "simple")]
    simple: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum ModeArg {
    /// Run all events back to back
    Continuous,
    /// Pause for input between events
    Step,
    /// Sleep between events by their time difference
    Realtime,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
#[value(rename_all = "snake_case")]
enum PolicyArg {
    None,
    Bankers,
    ResourceOrdering,
    Conservative,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
#[value(rename_all = "snake_case")]
enum RecoveryArg {
    None,
    PreemptLowPriority,
    PreemptMinCost,
    KillOne,
    KillAll,
}

impl From<PolicyArg> for PreventionStrategy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::None => Self::None,
            PolicyArg::Bankers => Self::Bankers,
            PolicyArg::ResourceOrdering => Self::ResourceOrdering,
            PolicyArg::Conservative => Self::Conservative,
        }
    }
}

impl From<RecoveryArg> for RecoveryStrategy {
    fn from(arg: RecoveryArg) -> Self {
        match arg {
            RecoveryArg::None => Self::None,
            RecoveryArg::PreemptLowPriority => Self::PreemptLowPriority,
            RecoveryArg::PreemptMinCost => Self::PreemptMinCost,
            RecoveryArg::KillOne => Self::KillOne,
            RecoveryArg::KillAll => Self::KillAll,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    println!("{} Deadlock Detection & Recovery Simulator\n", "🔒".bold());

    let scenario = match load_scenario(&cli) {
        Ok(scenario) => scenario,
        Err(err) => {
            eprintln!("{} {:#}", "✗".red().bold(), err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run_simulation(&cli, scenario).await {
        eprintln!("{} {:#}", "✗".red().bold(), err);
        std::process::exit(2);
    }
}

/// Load or generate the scenario and apply CLI policy overrides
fn load_scenario(cli: &Cli) -> Result<Scenario> {
    let mut scenario = if cli.simple {
        println!("Generating simple deadlock scenario...");
        simple_circular_scenario(3, 3, 1)
    } else if let Some(path) = &cli.scenario {
        println!("Loading scenario: {}", path.display());
        Scenario::from_file(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?
    } else {
        anyhow::bail!("Please specify --scenario or use --simple");
    };

    if let Some(policy) = cli.policy {
        scenario.prevention_policy = policy.into();
    }
    if let Some(recovery) = cli.recovery {
        scenario.recovery_policy = recovery.into();
    }
    Ok(scenario)
}

async fn run_simulation(cli: &Cli, scenario: Scenario) -> Result<()> {
    let mode = if cli.step_mode {
        ModeArg::Step
    } else {
        cli.mode
    };

    print_scenario_info(&scenario);

    let mut dispatcher =
        EventDispatcher::new(scenario).context("Failed to initialize simulation")?;
    if cli.verbose {
        register_verbose_callbacks(&mut dispatcher);
    }

    println!("{}  Starting simulation...\n", "▶️".bold());
    match mode {
        ModeArg::Step => run_stepwise(cli, &mut dispatcher)?,
        ModeArg::Realtime => {
            dispatcher.run_realtime(cli.speed).await;
        }
        ModeArg::Continuous => run_continuous(cli, &mut dispatcher),
    }

    print_summary(&dispatcher);

    if let Some(path) = &cli.export {
        let document = dispatcher.export_document();
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write export file {}", path.display()))?;
        println!("\n{} Exported to: {}", "💾".bold(), path.display());
    }

    Ok(())
}

fn print_scenario_info(scenario: &Scenario) {
    println!("\n{} Scenario: {}", "📋".bold(), scenario.name.cyan());
    if !scenario.description.is_empty() {
        println!("   {}", scenario.description);
    }
    println!("\n   Resources: {}", scenario.resources.len());
    println!("   Processes: {}", scenario.processes.len());
    println!("   Events: {}", scenario.events.len());
    println!("   Prevention Policy: {}", scenario.prevention_policy);
    println!("   Recovery Policy: {}", scenario.recovery_policy);
    println!();
}

fn register_verbose_callbacks(dispatcher: &mut EventDispatcher) {
    dispatcher.on_event(Box::new(|event, result| {
        let icon = if result.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  [{:.1}s] {} {}", event.time, icon, result.message);
    }));

    dispatcher.on_deadlock(Box::new(|analysis| {
        println!("\n  {}  DEADLOCK DETECTED!", "⚠️".yellow().bold());
        println!(
            "     Processes: {}",
            analysis.deadlocked_processes.join(", ").red()
        );
        println!(
            "     Resources: {}",
            analysis.deadlocked_resources.join(", ").red()
        );
    }));

    dispatcher.on_prevention(Box::new(|_, allowed, reason| {
        if !allowed {
            println!("  {}  Prevention: {}", "🛡️".bold(), reason);
        }
    }));

    dispatcher.on_recovery(Box::new(|outcome| {
        if outcome.success {
            println!("  {} Recovery: {}", "🔧".bold(), outcome.reason);
            println!(
                "     Affected: {}",
                outcome.affected_processes.join(", ")
            );
        } else {
            println!("  {} Recovery failed: {}", "✗".red().bold(), outcome.reason);
        }
    }));
}

fn run_stepwise(cli: &Cli, dispatcher: &mut EventDispatcher) -> Result<()> {
    let total = dispatcher.events().len();
    let stdin = io::stdin();
    let mut step_number = 1;

    loop {
        println!("Step {}/{}", step_number, total);
        let Some(result) = dispatcher.step() else {
            println!("\n{} Simulation complete", "✓".green().bold());
            break;
        };

        if !cli.verbose {
            let icon = if result.success {
                "✓".green()
            } else {
                "✗".red()
            };
            println!("  {} {}", icon, result.message);
        }

        step_number += 1;
        if !dispatcher.is_finished() {
            print!("\nPress Enter for next step...");
            io::stdout().flush()?;
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            println!();
        }
    }
    Ok(())
}

fn run_continuous(cli: &Cli, dispatcher: &mut EventDispatcher) {
    let total = dispatcher.events().len() as u64;
    let progress = if !cli.verbose && total > 1 {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} events")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Some(bar)
    } else {
        None
    };

    while dispatcher.step().is_some() {
        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    println!(
        "\n{} Simulation complete ({} snapshots)",
        "✓".green().bold(),
        dispatcher.snapshots().len()
    );
}

fn print_summary(dispatcher: &EventDispatcher) {
    let summary = dispatcher.get_summary();
    println!("\n{} Summary:", "📊".bold());
    println!("   Total Events: {}", summary.total_events);
    println!("   Executed: {}", summary.executed_events);
    println!("   Deadlocks Detected: {}", summary.deadlock_detected_count);
    println!("   Recovery Attempts: {}", summary.recovery_attempts);

    let analysis = analyze_deadlock(dispatcher.state());
    if analysis.has_deadlock {
        println!("\n{}  Final State: {}", "⚠️".yellow().bold(), "DEADLOCKED".red().bold());
        println!(
            "   Deadlocked Processes: {}",
            analysis.deadlocked_processes.join(", ")
        );
    } else {
        println!("\n{} Final State: {}", "✓".green().bold(), "NO DEADLOCK".green());
    }
}
