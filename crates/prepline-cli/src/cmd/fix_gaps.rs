//! Fix-gaps subcommand - re-harvest incomplete windows

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Args;

use prepline_core::SharedProgress;
use prepline_osf::{DateRange, HarvestError, Harvester, OsfClient, repair};

use super::harvest::{harvest_config, report};
use super::{open_stores, parse_date};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct FixGapsArgs {
    /// First day to check (YYYY-MM-DD, default: configured start date)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Last day to check (YYYY-MM-DD, default: yesterday)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// OSF preprint provider
    #[arg(short, long)]
    pub provider: Option<String>,
}

pub fn run(args: FixGapsArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let harvest = harvest_config(config, args.provider, None);
    let start = args.from.unwrap_or(harvest.start_date);
    let end = args.to.unwrap_or_else(|| Utc::now().date_naive());
    let range = DateRange::new(start, end)?;

    let (db, raw) = open_stores(config)?;
    let client = OsfClient::new(config.client_config())?;
    let harvester = Harvester::new(&client, &db, &raw, &harvest, progress);

    log::info!("Checking {} for gaps in {range}", harvest.provider);
    let summary = match repair(&harvester, &range) {
        Ok(summary) => summary,
        Err(HarvestError::SystemicOutage {
            consecutive_failures,
            last_error,
            summary,
        }) => {
            report(&summary, progress);
            anyhow::bail!(
                "API unreachable: {consecutive_failures} consecutive windows failed (last: {last_error})"
            );
        }
        Err(e) => return Err(e.into()),
    };

    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    if summary.harvest.interrupted {
        anyhow::bail!("Gap repair interrupted");
    }
    if !summary.is_clean() {
        anyhow::bail!("{} gaps still unresolved", summary.remaining.len());
    }
    Ok(())
}
