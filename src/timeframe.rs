use std::collections::BTreeMap;

const MINUTE_MS: i64 = 60 * 1000;

/// Parses a timeframe label such as `15m`, `1h` or `1M` into milliseconds.
///
/// Months count as 30 days and years as 365 days.
pub fn parse_duration_ms(label: &str) -> Result<i64, String> {
    let unit = label
        .chars()
        .last()
        .ok_or_else(|| "empty timeframe".to_string())?;
    let count: i64 = label[..label.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| format!("invalid timeframe {}", label))?;
    if count <= 0 {
        return Err(format!("invalid timeframe {}", label));
    }
    let unit_ms = match unit {
        'm' => MINUTE_MS,
        'h' => 60 * MINUTE_MS,
        'd' => 24 * 60 * MINUTE_MS,
        'w' => 7 * 24 * 60 * MINUTE_MS,
        'M' => 30 * 24 * 60 * MINUTE_MS,
        'y' => 365 * 24 * 60 * MINUTE_MS,
        _ => return Err(format!("unknown timeframe unit in {}", label)),
    };
    Ok(count * unit_ms)
}

/// Timeframe labels an exchange supports, with their bucket length in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeframeCatalog {
    durations: BTreeMap<String, i64>,
}

impl TimeframeCatalog {
    /// Builds a catalog from labels, rejecting any label that does not parse.
    pub fn from_labels<'a, I>(labels: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut durations = BTreeMap::new();
        for label in labels {
            durations.insert(label.to_string(), parse_duration_ms(label)?);
        }
        Ok(Self { durations })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.durations.contains_key(label)
    }

    pub fn duration_ms(&self, label: &str) -> Option<i64> {
        self.durations.get(label).copied()
    }

    /// Labels ordered from the shortest bucket to the longest.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<(&str, i64)> = self
            .durations
            .iter()
            .map(|(label, ms)| (label.as_str(), *ms))
            .collect();
        labels.sort_by_key(|(_, ms)| *ms);
        labels.into_iter().map(|(label, _)| label).collect()
    }
}
