//! `vermiqc`: command-line client for the vermiqc server.
//!
//! # Usage
//!
//! ```text
//! vermiqc import turno-a.csv --strict
//! vermiqc export --format csv --date-from 2024-03-01 --out marco.csv
//! vermiqc dashboard --from 2024-03-01 --to 2024-04-01 --granularity shift
//! vermiqc submit amostra.json
//! ```
//!
//! Exit codes: `0` success, `1` usage error, `2` data-validation failure,
//! `3` backend unavailable.

mod client;

use std::{io::Read as _, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use client::{ApiClient, ApiConfig, ClientError};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vermiqc_core::{
  dashboard::{DashboardQuery, DashboardReport, Granularity},
  ingest::{BatchReport, Submission},
  sample::{AnalysisKind, SampleFilter},
  verdict::Verdict,
};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vermiqc", version, about = "Client for the vermiqc QC server")]
struct Args {
  /// Path to a TOML config file (url, lang).
  #[arg(short, long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,

  /// Base URL of the vermiqc server (default: http://localhost:8080).
  #[arg(long, env = "VERMIQC_URL", global = true)]
  url: Option<String>,

  /// Language for server messages, e.g. `pt-BR`.
  #[arg(long, env = "VERMIQC_LANG", global = true)]
  lang: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Bulk-import a CSV file.
  Import {
    file:           PathBuf,
    /// Commit nothing if any row or sample fails.
    #[arg(long)]
    strict:         bool,
    /// Commit each sample on its own.
    #[arg(long)]
    per_row_commit: bool,
    /// Replace existing samples whose payload differs.
    #[arg(long)]
    update:         bool,
  },
  /// Export samples as CSV or JSON.
  Export {
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,
    /// Write to FILE instead of stdout.
    #[arg(long, value_name = "FILE")]
    out:    Option<PathBuf>,
    #[command(flatten)]
    filter: FilterArgs,
  },
  /// Print the dashboard for `[from, to)`.
  Dashboard {
    #[arg(long)]
    from:        NaiveDate,
    #[arg(long)]
    to:          NaiveDate,
    #[arg(long)]
    line:        Option<String>,
    #[arg(long)]
    product:     Option<String>,
    #[arg(long)]
    shift:       Option<String>,
    #[arg(long, default_value = "day")]
    granularity: Granularity,
    /// Print the raw JSON report.
    #[arg(long)]
    json:        bool,
  },
  /// Submit one sample from a JSON file (`-` for stdin).
  Submit { file: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
  Csv,
  Json,
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
  #[arg(long)]
  date_from: Option<NaiveDate>,
  #[arg(long)]
  date_to:   Option<NaiveDate>,
  #[arg(long)]
  line:      Option<String>,
  #[arg(long)]
  product:   Option<String>,
  #[arg(long)]
  shift:     Option<String>,
  #[arg(long)]
  kind:      Option<AnalysisKind>,
  #[arg(long)]
  verdict:   Option<Verdict>,
}

impl From<FilterArgs> for SampleFilter {
  fn from(a: FilterArgs) -> Self {
    SampleFilter {
      date_from: a.date_from,
      date_to:   a.date_to,
      line:      a.line,
      product:   a.product,
      shift:     a.shift,
      kind:      a.kind,
      verdict:   a.verdict,
      limit:     None,
      offset:    None,
    }
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:  String,
  #[serde(default)]
  lang: String,
}

fn api_config(args: &Args) -> Result<ApiConfig> {
  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  Ok(ApiConfig {
    base_url: args
      .url
      .clone()
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    lang:     args
      .lang
      .clone()
      .or_else(|| (!file_cfg.lang.is_empty()).then(|| file_cfg.lang.clone())),
  })
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(e) => {
      let _ = e.print();
      return ExitCode::from(if e.use_stderr() { 1 } else { 0 });
    }
  };

  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  match run(args).await {
    Ok(code) => code,
    Err(e) => {
      eprintln!("error: {e:#}");
      let code = e.downcast_ref::<ClientError>().map_or(1, ClientError::exit_code);
      ExitCode::from(code)
    }
  }
}

async fn run(args: Args) -> Result<ExitCode> {
  let client = ApiClient::new(api_config(&args)?)?;

  match args.command {
    Command::Import { file, strict, per_row_commit, update } => {
      let csv = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
      let report = client.import(csv, strict, per_row_commit, update).await?;
      print_import(&report);
      Ok(if report.errors.is_empty() { ExitCode::SUCCESS } else { ExitCode::from(2) })
    }

    Command::Export { format, out, filter } => {
      let extension = match format {
        Format::Csv => "csv",
        Format::Json => "json",
      };
      let body = client.export(extension, &filter.into()).await?;
      match out {
        Some(path) => std::fs::write(&path, body)
          .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{body}"),
      }
      Ok(ExitCode::SUCCESS)
    }

    Command::Dashboard { from, to, line, product, shift, granularity, json } => {
      let query = DashboardQuery { from, to, line, product, shift, granularity };
      let report = client.dashboard(&query).await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
      } else {
        print_dashboard(&report);
      }
      Ok(ExitCode::SUCCESS)
    }

    Command::Submit { file } => {
      let raw = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        buf
      } else {
        std::fs::read_to_string(&file)
          .with_context(|| format!("reading {}", file.display()))?
      };
      let submission: Submission =
        serde_json::from_str(&raw).context("parsing submission")?;
      let response = client.submit(&submission).await?;
      println!("{}", serde_json::to_string_pretty(&response)?);
      Ok(ExitCode::SUCCESS)
    }
  }
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn print_import(report: &BatchReport) {
  println!(
    "created {}  updated {}  unchanged {}  rejected {}{}",
    report.samples_created,
    report.samples_updated,
    report.samples_unchanged,
    report.rejected_samples.len(),
    if report.committed { "" } else { "  (nothing committed)" },
  );
  for e in &report.errors {
    eprintln!("row {}: {} ({})", e.row, e.error, e.code);
  }
}

fn print_dashboard(r: &DashboardReport) {
  println!("{} .. {} by {}", r.from, r.to, r.granularity);
  println!(
    "samples       {:>6}  approved {:>6}  alert {:>6}  rejected {:>6}  incomplete {:>6}",
    r.samples_total, r.samples_approved, r.samples_alert, r.samples_rejected,
    r.samples_incomplete,
  );
  println!(
    "measurements  {:>6}  approved {:>6}  alert {:>6}  rejected {:>6}  unspecified {:>5}",
    r.measurements_total,
    r.measurements_approved,
    r.measurements_alert,
    r.measurements_rejected,
    r.measurements_unspecified,
  );
  println!(
    "today {}: {} rejected, {} alert",
    r.today, r.today_rejections, r.today_alerts
  );
  for p in &r.per_property_rejection_rate {
    println!(
      "  {:<10} {:<12} {:>5}/{:<5} {:>6.1}%",
      p.product,
      p.property,
      p.measurements_rejected,
      p.measurements_total,
      p.rejection_rate * 100.0,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn import_flags_parse() {
    let args = Args::try_parse_from([
      "vermiqc", "--url", "http://qc:9000", "import", "a.csv", "--strict",
    ])
    .unwrap();
    assert_eq!(args.url.as_deref(), Some("http://qc:9000"));
    let Command::Import { strict, per_row_commit, .. } = args.command else {
      panic!("expected import");
    };
    assert!(strict);
    assert!(!per_row_commit);
  }

  #[test]
  fn export_filter_maps_to_sample_filter() {
    let args = Args::try_parse_from([
      "vermiqc", "export", "--verdict", "rejected", "--kind", "COMPOSITE",
    ])
    .unwrap();
    let Command::Export { filter, .. } = args.command else {
      panic!("expected export");
    };
    let filter = SampleFilter::from(filter);
    assert_eq!(filter.verdict, Some(Verdict::Rejected));
    assert_eq!(filter.kind, Some(AnalysisKind::Composite));
  }

  #[test]
  fn dashboard_requires_a_window() {
    let err = Args::try_parse_from(["vermiqc", "dashboard", "--from", "2024-03-01"])
      .unwrap_err();
    assert!(err.use_stderr());
  }

  #[test]
  fn flags_override_the_config_file() {
    let args = Args::try_parse_from(["vermiqc", "--lang", "pt-BR", "submit", "-"]).unwrap();
    let cfg = api_config(&args).unwrap();
    assert_eq!(cfg.base_url, "http://localhost:8080");
    assert_eq!(cfg.lang.as_deref(), Some("pt-BR"));
  }
}
