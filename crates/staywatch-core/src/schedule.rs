//! When runs happen and which runs a trigger produces.

use crate::{Region, Result, RunParams, StaywatchError};
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone};
use std::str::FromStr;

/// Fires once a day at a fixed wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    at: NaiveTime,
}

impl DailyTrigger {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// First firing strictly after `now`, in `now`'s time zone. A trigger time
    /// that falls in a DST gap fires an hour later that day.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut day = now.date_naive();

        loop {
            let naive = day.and_time(self.at);
            let candidate = tz
                .from_local_datetime(&naive)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest());

            if let Some(candidate) = candidate {
                if candidate > *now {
                    return candidate;
                }
            }

            match day.checked_add_days(Days::new(1)) {
                Some(next) => day = next,
                None => return now.clone(),
            }
        }
    }
}

impl FromStr for DailyTrigger {
    type Err = String;

    /// Parses `HH:MM` or `HH:MM:SS`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
            .map(Self::new)
            .map_err(|_| format!("Invalid trigger time: {}. Expected HH:MM", s))
    }
}

/// Regions and stay windows enumerated on every trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub regions: Vec<Region>,
    /// Consecutive check-in days starting from the trigger date.
    pub days: u32,
    /// Length of each stay.
    pub nights: u32,
}

impl RunPlan {
    pub fn new(regions: Vec<Region>, days: u32, nights: u32) -> Result<Self> {
        if regions.is_empty() {
            return Err(StaywatchError::Config("at least one region is required".to_string()));
        }
        if days == 0 || nights == 0 {
            return Err(StaywatchError::Config(
                "days and nights must both be at least 1".to_string(),
            ));
        }
        Ok(Self {
            regions,
            days,
            nights,
        })
    }

    /// Region-major list of runs for a trigger firing on `today`.
    pub fn runs_for(&self, today: NaiveDate) -> Vec<RunParams> {
        let mut runs = Vec::new();
        for region in &self.regions {
            for offset in 0..self.days {
                let Some(check_in) = today.checked_add_days(Days::new(u64::from(offset))) else {
                    continue;
                };
                let Some(check_out) = check_in.checked_add_days(Days::new(u64::from(self.nights))) else {
                    continue;
                };
                runs.push(RunParams {
                    region: region.clone(),
                    check_in,
                    check_out,
                });
            }
        }
        runs
    }
}
