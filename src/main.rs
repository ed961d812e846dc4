use anyhow::Result;
use apartment_finder::backend::{ComponentRuntime, RegistryLookup};
use apartment_finder::cli::Cli;
use apartment_finder::config::{Config, resolve_fixture_path, resolve_target};
use apartment_finder::fixture::Fixture;
use apartment_finder::report::render;
use apartment_finder::resolve::resolve;
use apartment_finder::telemetry::init_tracing;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli);
    init_tracing(config.verbose);

    match run(&cli, &config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &Config) -> Result<ExitCode> {
    if let Some(path) = resolve_fixture_path(cli) {
        tracing::info!(fixture = %path.display(), "resolving against fixture");
        let fixture = Fixture::load(&path)?;
        return execute(cli, config, &fixture.registry, &fixture.runtime);
    }

    run_native(cli, config)
}

#[cfg(windows)]
fn run_native(cli: &Cli, config: &Config) -> Result<ExitCode> {
    use apartment_finder::sys::{NativeRegistry, NativeRuntime};

    execute(cli, config, &NativeRegistry, &NativeRuntime)
}

#[cfg(not(windows))]
fn run_native(_cli: &Cli, _config: &Config) -> Result<ExitCode> {
    anyhow::bail!(
        "No COM runtime on this platform. Use --fixture or set {}",
        apartment_finder::config::FIXTURE_ENV
    )
}

fn execute<Reg, Rt>(cli: &Cli, config: &Config, registry: &Reg, runtime: &Rt) -> Result<ExitCode>
where
    Reg: RegistryLookup + ?Sized,
    Rt: ComponentRuntime + ?Sized,
{
    let outcome = resolve_target(cli, runtime)
        .and_then(|target| resolve(registry, runtime, config, &target));

    match outcome {
        Ok(resolution) => {
            print!("{}", render(&resolution, config)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::debug!(kind = ?err.kind(), "resolution failed");
            eprintln!("Error: {err}");
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}
