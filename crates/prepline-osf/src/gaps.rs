//! Gap detection and repair
//!
//! A gap is a day before today whose window is missing, `pending`,
//! `partial` or `failed`. Today is excluded: it is never complete.

use chrono::{Days, NaiveDate};
use prepline_store::{Db, HarvestWindow, StorageError};

use crate::client::{DateRange, PageSource};
use crate::error::HarvestError;
use crate::harvester::Harvester;
use crate::summary::RepairSummary;

/// Gaps in `range` for `provider`, oldest first.
pub fn find_gaps(
    db: &Db,
    provider: &str,
    range: &DateRange,
    today: NaiveDate,
) -> Result<Vec<HarvestWindow>, StorageError> {
    let Some(last) = today.checked_sub_days(Days::new(1)) else {
        return Ok(Vec::new());
    };
    let Some(range) = range.clamp_end(last) else {
        return Ok(Vec::new());
    };

    let mut stored = db
        .windows_in_range(provider, range.start(), range.end())?
        .into_iter()
        .peekable();
    let mut gaps = Vec::new();
    for day in range.days() {
        let window = match stored.next_if(|w| w.date == day) {
            Some(w) => w,
            None => HarvestWindow::missing(provider, day),
        };
        if !window.status.is_complete() {
            gaps.push(window);
        }
    }
    Ok(gaps)
}

/// Re-harvest every gap in `range` once.
///
/// Complete windows are never touched. A gap that fails again stays
/// unresolved and is listed in [`RepairSummary::remaining`].
pub fn repair<S: PageSource>(
    harvester: &Harvester<'_, S>,
    range: &DateRange,
) -> Result<RepairSummary, HarvestError> {
    let provider = harvester.provider();
    let gaps = find_gaps(harvester.db(), provider, range, harvester.today())?;
    if gaps.is_empty() {
        log::info!("{provider}: no gaps in {range}");
        return Ok(RepairSummary::default());
    }

    let missing = gaps.iter().filter(|w| !w.is_tracked()).count();
    log::info!(
        "{provider}: {} gaps in {range} ({missing} never harvested), oldest {}",
        gaps.len(),
        gaps[0].date
    );

    let days: Vec<NaiveDate> = gaps.iter().map(|w| w.date).collect();
    let harvest = harvester.harvest_windows(days.clone())?;

    let remaining = find_gaps(harvester.db(), provider, range, harvester.today())?
        .into_iter()
        .filter(|w| days.contains(&w.date))
        .collect();

    Ok(RepairSummary {
        gaps_found: gaps.len(),
        missing,
        harvest,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepline_store::{WindowStatus, WindowUpdate};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn mark(db: &Db, day: u32, status: WindowStatus) {
        db.finish_window(
            "example",
            d(day),
            &WindowUpdate {
                status,
                record_count: 0,
                pages: 0,
                attempted_at: "2024-03-20T00:00:00.000000Z",
                error: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn missing_and_incomplete_windows_are_gaps() {
        let db = Db::in_memory().unwrap();
        mark(&db, 1, WindowStatus::Complete);
        mark(&db, 2, WindowStatus::Partial);
        mark(&db, 4, WindowStatus::Failed);
        mark(&db, 5, WindowStatus::Complete);

        let range = DateRange::new(d(1), d(5)).unwrap();
        let gaps = find_gaps(&db, "example", &range, d(20)).unwrap();
        let found: Vec<_> = gaps.iter().map(|w| (w.date, w.status, w.is_tracked())).collect();
        assert_eq!(
            found,
            vec![
                (d(2), WindowStatus::Partial, true),
                (d(3), WindowStatus::Pending, false),
                (d(4), WindowStatus::Failed, true),
            ]
        );
    }

    #[test]
    fn today_is_never_a_gap() {
        let db = Db::in_memory().unwrap();
        let range = DateRange::new(d(1), d(5)).unwrap();
        let gaps = find_gaps(&db, "example", &range, d(5)).unwrap();
        assert_eq!(gaps.len(), 4);
        assert!(find_gaps(&db, "example", &DateRange::single(d(5)), d(5))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn other_providers_ignored() {
        let db = Db::in_memory().unwrap();
        mark(&db, 1, WindowStatus::Complete);
        let gaps = find_gaps(&db, "osf", &DateRange::single(d(1)), d(20)).unwrap();
        assert_eq!(gaps.len(), 1);
    }
}
