mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use tagsync_core::{CancelSignal, RunError, RunId, Tagger, TaggerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "tagsync",
    version,
    about = "Tag every store order with the payment gateway it was paid through"
)]
struct Cli {
    /// Test mode: process only the first N orders
    #[arg(long = "test", value_name = "N", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    limit: Option<usize>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of orders reconciled at once
    #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    concurrency: Option<usize>,

    /// Directory for general.log, error.log and result files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Stderr log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Load configuration and apply command-line overrides
    fn config(&self) -> anyhow::Result<TaggerConfig> {
        let mut config =
            TaggerConfig::load(self.config.as_deref()).context("invalid configuration")?;
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn mode(&self) -> String {
        match self.limit {
            Some(limit) => format!("Test mode (limit: {limit})"),
            None => "Full mode".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    let run_id = RunId::new();
    logging::init(&config.log_dir, &cli.log_level, run_id).context("failed to set up logging")?;
    tracing::info!("Order Tagger Started | Mode: {}", cli.mode());
    tracing::debug!(%run_id, ?config, "configuration loaded");

    let cancel = CancelSignal::new();
    let tagger = Tagger::connect(&config)
        .context("failed to create HTTP client")?
        .with_cancel(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received | Finishing in-flight requests (Ctrl-C again to abort)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt received | Aborting");
            std::process::exit(130);
        }
    });

    match tagger.run(cli.limit).await {
        Ok(summary) => {
            println!(
                "Processed {} of {} orders ({} tagged, {} already tagged, {} without gateway, {} failed)",
                summary.included,
                summary.fetched,
                summary.counts.tagged,
                summary.counts.already_tagged,
                summary.counts.skipped_no_gateway,
                summary.counts.failed
            );
            if let Some(path) = summary.output {
                println!("Results saved to {}", path.display());
            }
            if summary.not_dispatched > 0 {
                anyhow::bail!(
                    "run cancelled: {} orders were not processed",
                    summary.not_dispatched
                );
            }
            Ok(())
        }
        Err(RunError::Cancelled { fetched }) => {
            anyhow::bail!("run cancelled after fetching {fetched} orders: nothing was tagged")
        }
        Err(RunError::NothingFetched { cause: Some(cause) }) => {
            anyhow::bail!("no orders could be fetched: {cause}")
        }
        Err(RunError::NothingFetched { cause: None }) => {
            anyhow::bail!("no orders could be fetched: the store returned none")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn parses_test_limit() {
        let cli = Cli::try_parse_from(["tagsync", "--test", "10"]).unwrap();
        assert_eq!(cli.limit, Some(10));
        assert_eq!(cli.mode(), "Test mode (limit: 10)");
    }

    #[test]
    fn full_mode_by_default() {
        let cli = Cli::try_parse_from(["tagsync"]).unwrap();
        assert_eq!(cli.limit, None);
        assert_eq!(cli.mode(), "Full mode");
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn rejects_zero_limit() {
        assert!(Cli::try_parse_from(["tagsync", "--test", "0"]).is_err());
        assert!(Cli::try_parse_from(["tagsync", "--test", "-3"]).is_err());
        assert!(Cli::try_parse_from(["tagsync", "--test", "many"]).is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        assert!(Cli::try_parse_from(["tagsync", "--concurrency", "0"]).is_err());
        let cli = Cli::try_parse_from(["tagsync", "--concurrency", "8"]).unwrap();
        assert_eq!(cli.concurrency, Some(8));
    }

    #[test]
    fn overrides_apply_on_top_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagsync.toml");
        std::fs::write(
            &path,
            "store = \"demo.myshopify.com\"\naccess_token = \"shpat_x\"\nconcurrency = 2\n",
        )
        .unwrap();

        let args: Vec<OsString> = vec![
            "tagsync".into(),
            "--config".into(),
            path.clone().into_os_string(),
            "--concurrency".into(),
            "7".into(),
            "--log-dir".into(),
            dir.path().as_os_str().to_owned(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let config = cli.config().unwrap();

        assert_eq!(config.concurrency, 7);
        assert_eq!(config.log_dir, dir.path());
    }
}
