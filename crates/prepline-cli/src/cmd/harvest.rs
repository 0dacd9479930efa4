//! Harvest subcommand - fetch preprint metadata into the raw store

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Args;

use prepline_core::SharedProgress;
use prepline_osf::{DateRange, HarvestConfig, HarvestError, HarvestSummary, Harvester, OsfClient};

use super::{open_stores, parse_date};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// First day to harvest (YYYY-MM-DD, default: day after the last complete window)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Last day to harvest (YYYY-MM-DD, default: today)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// OSF preprint provider
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Windows harvested in parallel (one shared rate limit)
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Harvester settings with CLI overrides applied.
pub fn harvest_config(
    config: &Config,
    provider: Option<String>,
    workers: Option<usize>,
) -> HarvestConfig {
    let mut harvest = config.harvest_config();
    if let Some(provider) = provider {
        harvest.provider = provider;
    }
    if let Some(workers) = workers {
        harvest.workers = workers;
    }
    harvest
}

/// Explicit range from `--from`/`--to`; `None` when neither is given.
fn requested_range(args: &HarvestArgs, harvest: &HarvestConfig) -> Result<Option<DateRange>> {
    if args.from.is_none() && args.to.is_none() {
        return Ok(None);
    }
    let start = args.from.unwrap_or(harvest.start_date);
    let end = args.to.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Some(DateRange::new(start, end)?))
}

pub fn report(summary: &HarvestSummary, progress: &SharedProgress) {
    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
}

pub fn run(args: HarvestArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let harvest = harvest_config(config, args.provider.clone(), args.workers);
    let range = requested_range(&args, &harvest)?;
    let (db, raw) = open_stores(config)?;
    let client = OsfClient::new(config.client_config())?;

    log::info!("Harvesting {}", harvest.provider);
    log::info!("  Raw store: {}", raw.root().display());
    if let Some(range) = &range {
        log::info!("  Range: {range}");
    }

    let harvester = Harvester::new(&client, &db, &raw, &harvest, progress);
    let summary = match harvester.harvest_range(range) {
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

    report(&summary, progress);
    if summary.interrupted {
        anyhow::bail!("Harvest interrupted");
    }
    if summary.unresolved_count() > 0 {
        anyhow::bail!(
            "{} windows unresolved; run fix-gaps to retry",
            summary.unresolved_count()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(from: Option<&str>, to: Option<&str>) -> HarvestArgs {
        HarvestArgs {
            from: from.map(|s| parse_date(s).unwrap()),
            to: to.map(|s| parse_date(s).unwrap()),
            provider: None,
            workers: None,
        }
    }

    #[test]
    fn overrides_apply() {
        let config = Config::default();
        let h = harvest_config(&config, Some("socarxiv".into()), Some(4));
        assert_eq!(h.provider, "socarxiv");
        assert_eq!(h.workers, 4);
        assert_eq!(harvest_config(&config, None, None).provider, "psyarxiv");
    }

    #[test]
    fn range_defaults() {
        let h = HarvestConfig::default();
        assert!(requested_range(&args(None, None), &h).unwrap().is_none());

        let r = requested_range(&args(None, Some("2016-01-03")), &h).unwrap().unwrap();
        assert_eq!(r.start(), h.start_date);
        assert_eq!(r.len_days(), 3);

        assert!(requested_range(&args(Some("2024-03-05"), Some("2024-03-01")), &h).is_err());
    }
}
