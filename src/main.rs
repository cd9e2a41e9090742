use checkwebcert::config::{Config, ExporterSettings};
use checkwebcert::logger::init_logger;
use checkwebcert::metrics::{CertificateMetrics, Exporter};
use checkwebcert::report::{log_outcome, render};
use checkwebcert::{Prober, TargetAddress};
use clap::{CommandFactory, Parser};
use log::{error, info};
use std::path::PathBuf;
use std::process::exit;
use tokio::net::TcpListener;

/// Exit status for a failed probe.
const EXIT_PROBE_FAILED: i32 = 1;
/// Exit status for unusable arguments or configuration.
const EXIT_USAGE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "checkwebcert", version, about, long_about = None)]
struct Cli {
    /// Host to check: host, host:port or https://host[:port]
    target: Option<String>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Export the days left for Prometheus instead of checking once
    #[arg(long)]
    prometheus: bool,

    /// Port serving /metrics [default: 2112]
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Seconds between two probes in exporter mode [default: 10]
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Days value published when a probe fails [default: keep the last value]
    #[arg(long, value_name = "DAYS", allow_hyphen_values = true)]
    failure_value: Option<i64>,

    /// Output format: text, json or table [default: text]
    #[arg(short, long, value_name = "FORMAT")]
    output: Option<String>,

    /// Log each step of the probe
    #[arg(short, long)]
    verbose: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.generate_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let mut config = Config::default();
    if let Some(path) = &cli.config {
        match Config::from_file(path) {
            Ok(file_config) => config = config.merge_with(file_config),
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                exit(EXIT_USAGE);
            }
        }
    }
    let config = config.merge_with(Config::from_cli_args(
        cli.target,
        cli.output,
        cli.verbose.then_some(true),
        cli.prometheus.then_some(true),
        cli.port,
        cli.interval,
        cli.failure_value,
    ));

    let settings = match config.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}\n", e);
            let _ = Cli::command().print_help();
            exit(EXIT_USAGE);
        }
    };

    if let Err(e) = init_logger(settings.verbose) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let target = TargetAddress::parse_target(&settings.target);

    if let Some(exporter) = &settings.exporter {
        if let Err(e) = run_exporter(target, exporter) {
            error!("Exporter stopped: {:#}", e);
            exit(EXIT_PROBE_FAILED);
        }
        return;
    }

    let outcome = checkwebcert::probe(&target);
    log_outcome(&target, &outcome);
    match outcome {
        Ok(expiry) => println!("{}", render(&expiry, settings.output)),
        Err(_) => exit(EXIT_PROBE_FAILED),
    }
}

fn run_exporter(target: TargetAddress, settings: &ExporterSettings) -> anyhow::Result<()> {
    let prober = Prober::new()?;
    let metrics = CertificateMetrics::new()?;
    #[cfg(target_os = "linux")]
    metrics.registry().register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    let port = settings.port;
    let exporter = Exporter::new(target, prober, metrics, settings);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(
            "Serving metrics on http://{}/metrics, probing every {:?}",
            listener.local_addr()?,
            settings.interval
        );
        exporter.serve(listener).await
    })
}
