use clap::Parser;
use screen_abstraction::cli::commands::{cmd_plan, cmd_replay};
use screen_abstraction::cli::config::{Cli, Commands, resolve_config};
use screen_abstraction::planner::planner::PathConstraints;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v => info, -vv => debug; RUST_LOG still wins when set
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = resolve_config(&cli);

    match cli.command {
        Commands::Replay {
            steps,
            artifact,
            model,
            dump,
            format,
        } => {
            cmd_replay(
                config,
                &steps,
                artifact.as_deref(),
                model.as_deref(),
                dump.as_deref(),
                &format,
                cli.verbose,
            )?;
        }
        Commands::Plan {
            steps,
            artifact,
            model,
            to,
            from,
            allow_reset,
            allow_static,
            max_cost,
            relax,
        } => {
            let constraints = PathConstraints {
                allow_reset,
                allow_static,
                max_cost: max_cost.or(config.planner.max_cost),
                max_results: config.planner.max_results,
                any_action_on_target: false,
            };
            cmd_plan(
                config,
                &steps,
                artifact.as_deref(),
                model.as_deref(),
                &to,
                from.as_deref(),
                constraints,
                relax,
            )?;
        }
    }

    Ok(())
}
