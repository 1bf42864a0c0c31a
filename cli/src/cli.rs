use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use csv::StringRecord;

use market::config::SnrConfig;
use market::types::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[clap(name = "snr", version, about = "Replay price bars through the Hilbert SNR filter")]
pub struct Cli {
    /// CSV of `high,low` or `ts_ms,high,low` lines (`-` for stdin)
    #[clap(long, short, default_value = "-")]
    pub input: String,

    /// JSON file with filter parameters; flags below override it
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// History window and warm-up length in bars
    #[clap(long)]
    pub period: Option<usize>,

    /// Lower bound on the smoothed bar range
    #[clap(long)]
    pub range_floor: Option<f64>,

    /// Lower bound on the smoothed amplitude
    #[clap(long)]
    pub amplitude_floor: Option<f64>,

    /// Reject bars with non-positive prices or high < low
    #[clap(long)]
    pub validate_inputs: bool,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Only print bars once the filter has output
    #[clap(long)]
    pub only_valid: bool,
}

impl Cli {
    /// Resolve the filter config: defaults, then `--config`, then flags.
    pub fn filter_config(&self) -> Result<SnrConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => SnrConfig::default(),
        };

        if let Some(period) = self.period {
            cfg.period = period;
        }
        if let Some(range_floor) = self.range_floor {
            cfg.range_floor = range_floor;
        }
        if let Some(amplitude_floor) = self.amplitude_floor {
            cfg.amplitude_floor = amplitude_floor;
        }
        cfg.validate_inputs |= self.validate_inputs;

        cfg.validate()?;
        Ok(cfg)
    }
}

/// CSV reader for bar input: optional header, `#` comments, padded fields,
/// two or three columns per record.
pub(crate) fn bar_reader<R: io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input)
}

/// Stream `(line, bar)` pairs out of CSV input.
///
/// A first record with no numeric field is skipped as a header. With two
/// columns the bar index stands in for the timestamp.
pub(crate) fn read_bars<R: io::Read>(input: R) -> impl Iterator<Item = Result<(u64, Bar)>> {
    let mut index = 0u64;

    bar_reader(input)
        .into_records()
        .enumerate()
        .filter_map(move |(n, record)| {
            let record = match record {
                Ok(record) => record,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("failed to read bars"))),
            };
            if n == 0 && is_header(&record) {
                return None;
            }

            let line = record.position().map_or(0, |pos| pos.line());
            let bar = parse_bar_record(&record, index).with_context(|| format!("line {line}"));
            index += 1;
            Some(bar.map(|bar| (line, bar)))
        })
}

pub(crate) fn parse_bar_record(record: &StringRecord, index: u64) -> Result<Bar> {
    let parse_price = |s: &str| s.parse::<f64>().with_context(|| format!("bad price {s:?}"));

    let bar = match record.len() {
        2 => Bar::new(index, parse_price(&record[0])?, parse_price(&record[1])?),
        3 => Bar::new(
            record[0]
                .parse()
                .with_context(|| format!("bad timestamp {:?}", &record[0]))?,
            parse_price(&record[1])?,
            parse_price(&record[2])?,
        ),
        n => anyhow::bail!("expected 2 or 3 columns, got {n}"),
    };

    Ok(bar)
}

fn is_header(record: &StringRecord) -> bool {
    record.iter().all(|field| field.parse::<f64>().is_err())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("snr").chain(args.iter().copied()))
    }

    fn bars(input: &str) -> Result<Vec<(u64, Bar)>> {
        read_bars(input.as_bytes()).collect()
    }

    #[test]
    fn reads_two_and_three_column_records() {
        let got = bars("101.5, 100.25\n102,101\n").unwrap();
        assert_eq!(
            got,
            vec![(1, Bar::new(0, 101.5, 100.25)), (2, Bar::new(1, 102.0, 101.0))]
        );

        let got = bars("1700000000000,101,100\n").unwrap();
        assert_eq!(got, vec![(1, Bar::new(1_700_000_000_000, 101.0, 100.0))]);
    }

    #[test]
    fn skips_header_comments_and_blank_lines() {
        let input = "ts_ms, high, low\n# exported bars\n\n60000,101,100\n120000,102,100\n";

        let got = bars(input).unwrap();

        assert_eq!(
            got,
            vec![
                (4, Bar::new(60_000, 101.0, 100.0)),
                (5, Bar::new(120_000, 102.0, 100.0)),
            ]
        );
    }

    #[test]
    fn only_first_record_may_be_a_header() {
        let err = bars("high,low\n101,100\nhigh,low\n").unwrap_err();

        assert!(format!("{err:#}").contains("line 3"), "{err:#}");
    }

    #[test]
    fn rejects_malformed_records_with_line_number() {
        for input in ["101,100\n101\n", "101,100\n101,abc\n", "101,100\n-5,101,100\n"] {
            let err = bars(input).unwrap_err();
            assert!(format!("{err:#}").contains("line 2"), "{input:?}: {err:#}");
        }
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = cli(&["--period", "12", "--amplitude-floor", "0.01", "--validate-inputs"])
            .filter_config()
            .unwrap();

        assert_eq!(cfg.period, 12);
        assert_eq!(cfg.amplitude_floor, 0.01);
        assert_eq!(cfg.range_floor, 1e-5);
        assert!(cfg.validate_inputs);
    }

    #[test]
    fn invalid_flag_values_fail_validation() {
        assert!(cli(&["--period", "0"]).filter_config().is_err());
        assert!(cli(&["--range-floor=-1"]).filter_config().is_err());
    }

    #[test]
    fn default_format_is_text() {
        let c = cli(&[]);

        assert_eq!(c.format, OutputFormat::Text);
        assert_eq!(c.input, "-");
        assert!(!c.only_valid);
    }
}
