use clap::Parser;
use quiz_chain::{Solver, SolverConfig, trigger};
use std::process::ExitCode;
use std::sync::Arc;

mod args;
use args::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so RUST_LOG can come from it
    let _ = dotenvy::dotenv();
    env_logger::init();

    let args = Args::parse();

    let solver = match &args.config {
        Some(path) => match Solver::from_config_file(path) {
            Ok(solver) => solver,
            Err(e) => {
                ::log::error!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Solver::new(SolverConfig::default()),
    };
    let mut solver = solver.with_env();
    if let Some(depth) = args.max_depth {
        solver = solver.with_max_depth(depth);
    }
    if let Some(dir) = &args.output_dir {
        solver = solver.with_output_dir(dir);
    }

    if solver.config().fetch.render_enabled {
        println!("Note: page rendering requires a WebDriver server (e.g., ChromeDriver).");
    }

    let runner = match solver.start() {
        Ok(runner) => Arc::new(runner),
        Err(e) => {
            ::log::error!("Failed to start solver: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let interrupt = Arc::clone(&runner);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::info!("Interrupted, cancelling running jobs");
            interrupt.shutdown();
        }
    });

    match args.command {
        Command::Run { url } => {
            let start_time = std::time::Instant::now();
            let outcome = runner.run_job(&url).await;
            ::log::info!(
                "[{}] Finished in {:.2} seconds",
                outcome.job_id,
                start_time.elapsed().as_secs_f64()
            );
            for (i, visited) in outcome.visited.iter().enumerate() {
                println!("{:>3}. {}", i + 1, visited);
            }
            println!("{}", outcome.termination);
            if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| runner.context().config.trigger.bind_addr.clone());
            match trigger::serve(runner, &bind).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    ::log::error!("Server on {} failed: {}", bind, e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
