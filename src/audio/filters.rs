use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PlaybackError;

/// Audio filters a sink may apply when a stream starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Filter {
    BassBoost,
    Nightcore,
    Vaporwave,
    Treble,
    Karaoke,
}

impl Filter {
    pub const ALL: [Filter; 5] = [
        Filter::BassBoost,
        Filter::Nightcore,
        Filter::Vaporwave,
        Filter::Treble,
        Filter::Karaoke,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Filter::BassBoost => "bassboost",
            Filter::Nightcore => "nightcore",
            Filter::Vaporwave => "vaporwave",
            Filter::Treble => "treble",
            Filter::Karaoke => "karaoke",
        }
    }

    /// Filters that sit behind the caller's entitlement check.
    pub fn is_premium(self) -> bool {
        matches!(self, Filter::Nightcore | Filter::Vaporwave | Filter::Karaoke)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filter {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bassboost" | "bass" | "bass_boost" => Ok(Filter::BassBoost),
            "nightcore" => Ok(Filter::Nightcore),
            "vaporwave" => Ok(Filter::Vaporwave),
            "treble" => Ok(Filter::Treble),
            "karaoke" => Ok(Filter::Karaoke),
            other => Err(PlaybackError::InvalidArgument(format!(
                "unknown filter `{other}`"
            ))),
        }
    }
}

/// Filter name → intensity (1..=100). Absent means off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSettings {
    levels: BTreeMap<Filter, u8>,
}

impl FilterSettings {
    pub const MAX_INTENSITY: i64 = 100;

    /// Sets a filter level; `0` removes it.
    pub fn set(&mut self, filter: Filter, intensity: i64) -> Result<(), PlaybackError> {
        if !(0..=Self::MAX_INTENSITY).contains(&intensity) {
            return Err(PlaybackError::InvalidArgument(format!(
                "intensity must be between 0 and {}, got {intensity}",
                Self::MAX_INTENSITY
            )));
        }

        if intensity == 0 {
            self.levels.remove(&filter);
        } else {
            self.levels.insert(filter, intensity as u8);
        }
        Ok(())
    }

    pub fn get(&self, filter: Filter) -> Option<u8> {
        self.levels.get(&filter).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Filter, u8)> + '_ {
        self.levels.iter().map(|(filter, level)| (*filter, *level))
    }

    pub fn describe(&self) -> String {
        if self.levels.is_empty() {
            return "none".to_string();
        }
        self.iter()
            .map(|(filter, level)| format!("{filter} {level}%"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filter_names_and_aliases() {
        assert_eq!("Bass".parse::<Filter>(), Ok(Filter::BassBoost));
        assert_eq!(" nightcore ".parse::<Filter>(), Ok(Filter::Nightcore));
        assert!(matches!(
            "reverb".parse::<Filter>(),
            Err(PlaybackError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_intensity_removes_filter() {
        let mut filters = FilterSettings::default();
        filters.set(Filter::BassBoost, 40).unwrap();
        assert_eq!(filters.get(Filter::BassBoost), Some(40));

        filters.set(Filter::BassBoost, 0).unwrap();
        assert!(filters.is_empty());
    }

    #[test]
    fn out_of_range_intensity_leaves_settings_untouched() {
        let mut filters = FilterSettings::default();
        filters.set(Filter::Treble, 10).unwrap();

        assert!(filters.set(Filter::Treble, 101).is_err());
        assert!(filters.set(Filter::Treble, -1).is_err());
        assert_eq!(filters.get(Filter::Treble), Some(10));
        assert_eq!(filters.describe(), "treble 10%");
    }
}
