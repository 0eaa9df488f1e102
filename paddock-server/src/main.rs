use clap::Parser;
use log::info;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::fs::OpenOptions;
use std::io;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use paddock_server::{Cli, Pipeline, PipelineConfig, VERSION};

mod web;

use web::Web;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    init_logging(&args)?;
    info!("paddock-server {} starting", VERSION);

    Toplevel::new(|s| async move {
        s.start(SubsystemBuilder::new("Pipeline", move |subsys| {
            run_pipeline(subsys, args)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(5000))
    .await
    .map_err(Into::into)
}

/// Binds the telemetry sockets and starts the web server. A bind failure
/// fails this subsystem, which makes the whole process exit with an error.
async fn run_pipeline(subsys: SubsystemHandle, args: Cli) -> io::Result<()> {
    let port = args.telemetry_port;
    let pipeline = match Pipeline::new(&subsys, PipelineConfig::from(&args)) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            let message = format!("Cannot listen for telemetry on port {}: {}", port, e);
            return Err(io::Error::new(e.kind(), message));
        }
    };

    let web = Web::new(pipeline, args.port);
    subsys.start(SubsystemBuilder::new("Webserver", |s| {
        web.run(s)
    }));

    subsys.on_shutdown_requested().await;
    Ok(())
}

fn init_logging(args: &Cli) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(args.verbose.log_level_filter())
        .format_timestamp_micros();

    if let Some(path) = &args.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Cannot open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    #[tokio::test]
    async fn test_telemetry_port_in_use_fails_startup() {
        let taken = UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port().to_string();
        let args = Cli::parse_from([
            "paddock-server",
            "--telemetry-port",
            port.as_str(),
            "--replay-port",
            "0",
            "--port",
            "0",
        ]);

        let result = Toplevel::new(|s| async move {
            s.start(SubsystemBuilder::new("Pipeline", move |subsys| {
                run_pipeline(subsys, args)
            }));
        })
        .handle_shutdown_requests(Duration::from_secs(2))
        .await;

        assert!(result.is_err());
    }
}
