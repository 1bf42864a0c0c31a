pub mod cli;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, OutputFormat, read_bars};
use common::logger::{TraceId, init_logger, root_span};
use market::pulse::{Pulse, PulseValidity, SnrPulse};

fn open_input(path: &str) -> Result<Box<dyn Read>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger("snr");

    let cfg = cli.filter_config()?;
    let mut pulse = SnrPulse::new(cfg)?;

    let trace_id = TraceId::new();
    let span = root_span("replay", &trace_id);
    let _guard = span.enter();
    info!(input = %cli.input, period = cfg.period, "replaying bars");

    let reader = open_input(&cli.input)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut rejected = 0u64;

    for bar in read_bars(reader) {
        let (line, bar) = bar?;

        let result = match pulse.evaluate(bar.into()) {
            Ok(result) => result,
            Err(e) => {
                warn!(line, error = %e, "bar rejected");
                rejected += 1;
                continue;
            }
        };

        if cli.only_valid && result.validity != PulseValidity::Valid {
            continue;
        }

        match cli.format {
            OutputFormat::Text => writeln!(
                out,
                "{}\t{:.6}\t{}",
                result.ts_ms,
                result.value,
                if result.validity == PulseValidity::Valid {
                    "valid"
                } else {
                    "warmup"
                }
            )?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut out, &result)?;
                writeln!(out)?;
            }
        }
    }

    out.flush()?;
    info!(
        bars = pulse.observation_count(),
        rejected,
        has_output = pulse.has_output(),
        value = pulse.value(),
        "replay finished"
    );

    Ok(())
}
