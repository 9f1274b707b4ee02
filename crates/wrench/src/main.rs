//! `wrench` binary.

use std::path::PathBuf;

use anyhow::Context;
use wrench::Gateway;

/// Command-line arguments.
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    manifests: Vec<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => match args.next() {
                    Some(path) => parsed.config = Some(PathBuf::from(path)),
                    None => fail("--config needs a path"),
                },
                "--manifest" | "-m" => match args.next() {
                    Some(path) => parsed.manifests.push(PathBuf::from(path)),
                    None => fail("--manifest needs a path"),
                },
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("wrench {}", wrench::VERSION);
                    std::process::exit(0);
                }
                other => fail(&format!("unknown argument: {other}")),
            }
        }

        parsed
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    eprintln!("Use --help for usage information");
    std::process::exit(2);
}

fn print_help() {
    println!(
        r"Wrench - manifest-driven HTTP gateway

USAGE:
    wrench [OPTIONS]

OPTIONS:
    -c, --config <PATH>      Process configuration (TOML or JSON, default: ./wrench.toml)
    -m, --manifest <PATH>    Manifest file or directory; repeatable, merged in order
    -h, --help               Print help information
    -v, --version            Print version information

ENVIRONMENT VARIABLES:
    WRENCH__SERVER__HTTP_ADDR              Listen address (default: 0.0.0.0:8080)
    WRENCH__SERVER__REQUEST_TIMEOUT_MS     Chain deadline in milliseconds
    WRENCH__TELEMETRY__LOGGING__LEVEL      Log level or filter
    WRENCH__TELEMETRY__METRICS__ENABLED    Prometheus exporter on/off
    WRENCH__MANIFEST__PATHS                Comma-separated manifest paths

EXAMPLES:
    wrench --config /etc/wrench/wrench.toml --manifest /etc/wrench/manifest.yaml
    WRENCH__SERVER__HTTP_ADDR=127.0.0.1:9000 wrench -m routes/
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let gateway = Gateway::load(args.config.as_deref(), &args.manifests)
        .context("failed to load configuration")?;
    gateway.run().await.context("gateway stopped with an error")?;
    Ok(())
}
