//! Stream a headset (or the debug generator) through the spectral pipeline
//!
//! Signal flow: device socket → connector buses → spectral processor →
//! console log / recordings.

use std::time::Duration;

use anyhow::Context;
use tracing::info;

use neuro_device::{ConnectorConfig, DeviceConnector};
use neuro_processing::{ProcessorConfig, SignalProcessor};

struct CliOptions {
    debug: bool,
    seconds: u64,
    hostname: String,
    port: u16,
    record: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            debug: false,
            seconds: 10,
            hostname: "127.0.0.1".to_string(),
            port: 13854,
            record: false,
        }
    }
}

fn parse_options(mut args: impl Iterator<Item = String>) -> anyhow::Result<CliOptions> {
    let mut options = CliOptions::default();
    while let Some(argument) = args.next() {
        match argument.as_str() {
            "--debug" => options.debug = true,
            "--record" => options.record = true,
            "--seconds" => {
                options.seconds = args
                    .next()
                    .context("--seconds needs a value")?
                    .parse()
                    .context("--seconds must be an integer")?;
            }
            "--host" => {
                options.hostname = args.next().context("--host needs a value")?;
            }
            "--port" => {
                options.port = args
                    .next()
                    .context("--port needs a value")?
                    .parse()
                    .context("--port must be a port number")?;
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let options = parse_options(std::env::args().skip(1))?;

    let connector = DeviceConnector::new(ConnectorConfig {
        hostname: options.hostname.clone(),
        port: options.port,
        debug: options.debug,
        verbose: true,
    });
    let processor = SignalProcessor::new(ProcessorConfig {
        live_mode: true,
        ..Default::default()
    })?;

    let feeder = processor.clone();
    let _raw = connector
        .raw_samples()
        .subscribe(move |sample| feeder.add_sample(f64::from(*sample)));
    let _rate = connector
        .sampling_rate()
        .subscribe(|tick| info!(samples_per_second = *tick, "rate tick"));
    let _spectra = processor
        .spectrum()
        .subscribe(|spectrum| info!(bins = spectrum.len(), "spectrum published"));

    connector.start().await.context("device connection failed")?;
    if options.record {
        let window = Duration::from_secs(options.seconds);
        connector.record("./connector_data.json", window);
        processor.record("./processor_data.json", window);
    }

    tokio::time::sleep(Duration::from_secs(options.seconds)).await;

    processor.close();
    connector.close().await;
    if options.record {
        connector.await_recording().await;
        processor.await_recording().await;
    }
    Ok(())
}
