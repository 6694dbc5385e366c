use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calendar::{YearMonth, grid_end, grid_start};
use crate::query::format_day;

/// One public holiday, in the `{date, name, localName}` record shape used by
/// public-holiday APIs. Extra fields in the source are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    #[serde(default)]
    pub local_name: String,
}

impl Holiday {
    /// Local name when it differs from the English one.
    pub fn display_name(&self) -> String {
        if self.local_name.is_empty() || self.local_name == self.name {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.local_name)
        }
    }
}

/// `YYYY-MM-DD` -> holiday.
pub type HolidayMap = BTreeMap<String, Holiday>;

pub trait HolidayProvider {
    fn fetch(&self, country: &str, year: i32) -> anyhow::Result<Vec<Holiday>>;
}

/// Reads `<dir>/<COUNTRY>-<year>.json`, each a JSON array of holiday records.
#[derive(Debug, Clone)]
pub struct DirHolidayProvider {
    dir: PathBuf,
}

impl DirHolidayProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, country: &str, year: i32) -> PathBuf {
        self.dir.join(format!("{country}-{year}.json"))
    }
}

impl HolidayProvider for DirHolidayProvider {
    #[tracing::instrument(skip(self))]
    fn fetch(&self, country: &str, year: i32) -> anyhow::Result<Vec<Holiday>> {
        let path = self.path_for(country, year);
        if !path.exists() {
            debug!(file = %path.display(), "no holiday file");
            return Ok(vec![]);
        }
        load_holiday_file(&path)
    }
}

fn load_holiday_file(path: &Path) -> anyhow::Result<Vec<Holiday>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let holidays: Vec<Holiday> = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    info!(file = %path.display(), count = holidays.len(), "loaded holidays");
    Ok(holidays)
}

/// Memoises provider lookups by (country, year). Failed lookups are logged,
/// treated as empty and retried on the next call.
#[derive(Debug)]
pub struct HolidayCache<P> {
    provider: P,
    entries: HashMap<(String, i32), Vec<Holiday>>,
}

impl<P: HolidayProvider> HolidayCache<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            entries: HashMap::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn holidays(&mut self, country: &str, year: i32) -> &[Holiday] {
        let key = (normalize_country(country), year);
        if key.0.is_empty() {
            return &[];
        }

        if !self.entries.contains_key(&key) {
            match self.provider.fetch(&key.0, year) {
                Ok(list) => {
                    self.entries.insert(key.clone(), list);
                }
                Err(err) => {
                    warn!(country = %key.0, year, error = %err, "holiday lookup failed");
                    return &[];
                }
            }
        }

        self.entries.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Holidays for every day the month's 42-day grid shows, which may span
    /// two calendar years.
    #[tracing::instrument(skip(self), fields(year_month = %year_month))]
    pub fn for_grid(&mut self, country: &str, year_month: YearMonth) -> HolidayMap {
        let start = grid_start(year_month);
        let end = grid_end(year_month);

        let mut map = HolidayMap::new();
        for year in start.year()..=end.year() {
            for holiday in self.holidays(country, year) {
                if holiday.date >= start && holiday.date <= end {
                    map.insert(format_day(holiday.date), holiday.clone());
                }
            }
        }
        debug!(count = map.len(), "holidays in grid range");
        map
    }
}

fn normalize_country(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use anyhow::anyhow;
    use chrono::NaiveDate;

    use super::*;

    struct Recording {
        calls: RefCell<Vec<(String, i32)>>,
        fail: bool,
    }

    impl Recording {
        fn new(fail: bool) -> Self {
            Self {
                calls: RefCell::new(vec![]),
                fail,
            }
        }
    }

    impl HolidayProvider for Recording {
        fn fetch(&self, country: &str, year: i32) -> anyhow::Result<Vec<Holiday>> {
            self.calls.borrow_mut().push((country.to_string(), year));
            if self.fail {
                return Err(anyhow!("offline"));
            }
            let date = |m, d| NaiveDate::from_ymd_opt(year, m, d).expect("valid date");
            Ok(vec![
                Holiday {
                    date: date(1, 1),
                    name: "New Year's Day".to_string(),
                    local_name: "Neujahr".to_string(),
                },
                Holiday {
                    date: date(12, 25),
                    name: "Christmas Day".to_string(),
                    local_name: "Christmas Day".to_string(),
                },
            ])
        }
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).expect("valid month")
    }

    #[test]
    fn cache_hits_provider_once_per_country_year() {
        let mut cache = HolidayCache::new(Recording::new(false));
        cache.holidays("de", 2024);
        cache.holidays(" DE ", 2024);
        cache.holidays("DE", 2025);
        assert_eq!(
            *cache.provider().calls.borrow(),
            vec![("DE".to_string(), 2024), ("DE".to_string(), 2025)]
        );
    }

    #[test]
    fn december_grid_loads_both_years() {
        let mut cache = HolidayCache::new(Recording::new(false));
        let map = cache.for_grid("DE", ym(2024, 12));

        assert!(map.contains_key("2024-12-25"));
        assert!(map.contains_key("2025-01-01"));
        assert!(!map.contains_key("2024-01-01"));
        assert_eq!(cache.provider().calls.borrow().len(), 2);
    }

    #[test]
    fn failed_lookup_is_empty_and_retried() {
        let mut cache = HolidayCache::new(Recording::new(true));
        assert!(cache.for_grid("US", ym(2024, 6)).is_empty());
        assert!(cache.for_grid("US", ym(2024, 6)).is_empty());
        assert_eq!(cache.provider().calls.borrow().len(), 2);
    }

    #[test]
    fn blank_country_skips_provider() {
        let mut cache = HolidayCache::new(Recording::new(false));
        assert!(cache.for_grid("  ", ym(2024, 6)).is_empty());
        assert!(cache.provider().calls.borrow().is_empty());
    }

    #[test]
    fn dir_provider_reads_api_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provider = DirHolidayProvider::new(temp.path());
        std::fs::write(
            provider.path_for("FR", 2024),
            r#"[{"date":"2024-07-14","localName":"Fête nationale","name":"Bastille Day","countryCode":"FR","global":true}]"#,
        )
        .expect("write holidays");

        let list = provider.fetch("FR", 2024).expect("fetch");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].display_name(), "Bastille Day (Fête nationale)");
        assert!(provider.fetch("FR", 2023).expect("missing file").is_empty());
    }
}
