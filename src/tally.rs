//! Categorical tally of capacity states.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{CapacityDimension, Facility};

/// Label counted for facilities that did not report a state
pub const UNSET_LABEL: &str = "";

/// Frequency of each state label within one region and one dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tally(BTreeMap<String, usize>);

impl Tally {
    /// Count state values; unset values are counted under [`UNSET_LABEL`].
    ///
    /// An empty input yields `{"": 0}` rather than an empty map.
    pub fn from_states<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let counts = states.into_iter().fold(BTreeMap::new(), |mut acc, state| {
            *acc.entry(state.unwrap_or(UNSET_LABEL).to_string())
                .or_insert(0usize) += 1;
            acc
        });

        if counts.is_empty() {
            return Self(BTreeMap::from([(UNSET_LABEL.to_string(), 0)]));
        }
        Self(counts)
    }

    pub fn get(&self, label: &str) -> usize {
        self.0.get(label).copied().unwrap_or(0)
    }

    /// Sum of all counts
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// One tally per capacity dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityTallies(BTreeMap<CapacityDimension, Tally>);

impl CapacityTallies {
    pub fn from_facilities(facilities: &[&Facility]) -> Self {
        Self(
            CapacityDimension::all()
                .iter()
                .map(|&dimension| {
                    let tally = Tally::from_states(facilities.iter().map(|f| f.state(dimension)));
                    (dimension, tally)
                })
                .collect(),
        )
    }

    pub fn get(&self, dimension: CapacityDimension) -> Option<&Tally> {
        self.0.get(&dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CapacityDimension, &Tally)> {
        self.0.iter().map(|(d, t)| (*d, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::facility::tests::hospital;

    #[test]
    fn test_counts() {
        let tally = Tally::from_states(vec![Some("free"), Some("full"), Some("free")]);
        assert_eq!(tally.get("free"), 2);
        assert_eq!(tally.get("full"), 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_unset_is_counted() {
        let tally = Tally::from_states(vec![None, Some("full"), None]);
        assert_eq!(tally.get(UNSET_LABEL), 2);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_empty_region() {
        let tally = Tally::from_states(Vec::<Option<&str>>::new());
        assert_eq!(serde_json::to_value(&tally).unwrap(), serde_json::json!({"": 0}));
        assert_eq!(tally.total(), 0);
    }

    #[test]
    fn test_tallies_sum_to_member_count() {
        let records = vec![
            hospital("a", 0.0, 0.0, Some("VERFUEGBAR")),
            hospital("b", 0.0, 0.0, None),
            hospital("c", 0.0, 0.0, Some("BEGRENZT")),
        ];
        let facilities: Vec<Facility> =
            records.into_iter().filter_map(Facility::from_record).collect();
        let members: Vec<&Facility> = facilities.iter().collect();

        let tallies = CapacityTallies::from_facilities(&members);
        for (_, tally) in tallies.iter() {
            assert_eq!(tally.total(), 3);
        }
        // Unreported dimensions still count every facility
        let ecmo = tallies.get(CapacityDimension::Ecmo).unwrap();
        assert_eq!(ecmo.get(UNSET_LABEL), 3);
    }
}
