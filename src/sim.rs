use std::process;

use env_logger::{Builder, Env};
use log::{info, warn, LevelFilter};

use sim_lib::console::Console;
use sim_lib::error::{SimulatorError, SimulatorResult};
use sim_lib::flags::SimArgs;
use sim_lib::report::PerformanceReport;
use sim_lib::system::{HierarchyPolicy, MulticoreSystem};
use sim_lib::trace;

fn main() {
    let args = SimArgs::from_env_or_exit();

    let mut logger =
        Builder::from_env(Env::default().default_filter_or("warn"));
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: SimArgs) -> SimulatorResult<()> {
    let mut policy = HierarchyPolicy::default();
    if let Some(latency) = args.memory_latency {
        policy.memory_latency = latency;
    }
    if let Some(cycles) = args.max_stall {
        policy.max_stall_cycles = cycles;
    }
    let mut system = MulticoreSystem::make(policy)?;

    if args.interactive {
        Console::new(system).run();
        return Ok(());
    }

    let trace_path = args.trace_file.ok_or_else(|| {
        SimulatorError::ConfigError(
            "a trace file is required unless --interactive is given".into(),
        )
    })?;
    let operations = trace::fetch_operations(&trace_path)?;
    info!(
        "running {} operations from {}",
        operations.len(),
        trace_path.display()
    );

    let completions = system.run_operations(&operations)?;
    // L2 evictions do not back-invalidate L1, so this can legitimately fail
    if let Err(e) = system.verify_inclusion() {
        warn!("{}", e);
    }

    let report = PerformanceReport::make(system.stats(), &completions);
    if args.history {
        eprintln!("{}", report);
    } else {
        eprintln!(
            "[HISTORY] # cycles = {}, # operations = {}, AMAT = {:.2}",
            report.stats.cycles, report.num_operations, report.amat
        );
    }
    if let Some(path) = args.csv {
        report.write_csv(&path)?;
    }

    Ok(())
}
