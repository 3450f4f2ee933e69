//! # Billing Deploy Runtime
//!
//! `deploy-runtime [FUNCTION|all] [--dry-run] [--print-topology] ...`
//!
//! See the library docs for the run sequence and exit codes.

use std::process::ExitCode;

use billing_deploy::DeployConfig;
use billing_telemetry::{init_telemetry, TelemetryConfig};
use clap::Parser;
use tracing::error;

use deploy_runtime::cli::usage;
use deploy_runtime::{execute, Args, EXIT_SUCCESS, EXIT_USAGE};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too.
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let invocation = match args.resolve(DeployConfig::from_env()) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("error: {e}\n\n{}", usage());
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let mut telemetry_config = TelemetryConfig::from_env();
    if args.verbose {
        telemetry_config = telemetry_config.verbose();
    }
    let telemetry = match init_telemetry(&telemetry_config) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let print_metrics = invocation.print_metrics;
    let mut stdout = std::io::stdout();
    let code = match execute(invocation, &mut stdout).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Run aborted");
            eprintln!("error: {e:#}");
            EXIT_USAGE
        }
    };

    if print_metrics {
        match telemetry.metrics.render() {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("warning: {e}"),
        }
    }

    ExitCode::from(code)
}
