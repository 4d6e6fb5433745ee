//! Sample-rate selection over a fixed capability table.
//!
//! Each device family builds a [`DecimationProfile`] listing every rate its
//! decimation chain can produce, tagged with the family's own code type.
//! Entries are kept sorted by rate, which makes selection a binary search
//! and guarantees it is monotonic in the requested rate.

use crate::helpers::rate_label_ksps;

/// One achievable sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecimationChoice<C> {
    /// Device-specific setting that produces this rate.
    pub code: C,
    pub rate_hz: u32,
    /// Label for the rate selector.
    pub label: String,
}

impl<C> DecimationChoice<C> {
    /// A choice labelled with its rate in ksps.
    pub fn new(code: C, rate_hz: u32) -> Self {
        DecimationChoice {
            code,
            rate_hz,
            label: rate_label_ksps(rate_hz as f64),
        }
    }

    pub fn labelled(code: C, rate_hz: u32, label: &str) -> Self {
        DecimationChoice {
            code,
            rate_hz,
            label: label.to_string(),
        }
    }
}

/// Ordered table of achievable sample rates.
#[derive(Debug, Clone, PartialEq)]
pub struct DecimationProfile<C> {
    choices: Vec<DecimationChoice<C>>,
}

impl<C: Clone> DecimationProfile<C> {
    /// Build a profile. Entries are sorted by rate; the sort is stable so
    /// equal rates keep their given order.
    pub fn new(mut choices: Vec<DecimationChoice<C>>) -> Self {
        choices.sort_by_key(|c| c.rate_hz);
        DecimationProfile { choices }
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DecimationChoice<C>> {
        self.choices.get(index)
    }

    pub fn choices(&self) -> &[DecimationChoice<C>] {
        &self.choices
    }

    pub fn labels(&self) -> Vec<String> {
        self.choices.iter().map(|c| c.label.clone()).collect()
    }

    /// Lowest and highest rate, or `None` for an empty table.
    pub fn range(&self) -> Option<(u32, u32)> {
        Some((self.choices.first()?.rate_hz, self.choices.last()?.rate_hz))
    }

    /// Index of the entry closest to `requested_hz`. Ties go to the lower
    /// rate.
    pub fn select_index(&self, requested_hz: u32) -> Option<usize> {
        if self.choices.is_empty() {
            return None;
        }
        let above = self.choices.partition_point(|c| c.rate_hz < requested_hz);
        if above == 0 {
            return Some(0);
        }
        if above == self.choices.len() {
            return Some(above - 1);
        }
        let below_gap = requested_hz - self.choices[above - 1].rate_hz;
        let above_gap = self.choices[above].rate_hz - requested_hz;
        Some(if above_gap < below_gap { above } else { above - 1 })
    }

    /// Closest achievable rate to `requested_hz`: `(code, achieved_rate)`.
    pub fn select(&self, requested_hz: u32) -> Option<(C, u32)> {
        let choice = &self.choices[self.select_index(requested_hz)?];
        Some((choice.code.clone(), choice.rate_hz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> DecimationProfile<u32> {
        let clock = 122_880_000u32;
        DecimationProfile::new(
            [2560, 1280, 640, 512, 320, 256, 128, 80, 64]
                .iter()
                .map(|&d| DecimationChoice::new(d, clock / d))
                .collect(),
        )
    }

    #[test]
    fn sorted_by_rate() {
        let p = profile();
        let rates: Vec<u32> = p.choices().iter().map(|c| c.rate_hz).collect();
        assert!(rates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(p.range(), Some((48_000, 1_920_000)));
        assert_eq!(p.labels()[0], "48");
        assert_eq!(p.labels()[8], "1920");
    }

    #[test]
    fn selects_nearest() {
        let p = profile();
        assert_eq!(p.select(48_000), Some((2560, 48_000)));
        assert_eq!(p.select(100_000), Some((1280, 96_000)));
        assert_eq!(p.select(1), Some((2560, 48_000)));
        assert_eq!(p.select(10_000_000), Some((64, 1_920_000)));
        // 216 ksps is equidistant from 192 and 240; the lower wins.
        assert_eq!(p.select(216_000), Some((640, 192_000)));
    }

    #[test]
    fn selection_is_monotonic() {
        let p = profile();
        let mut last = 0;
        for r in (0..2_500_000).step_by(1_777) {
            let (_, achieved) = p.select(r).unwrap();
            assert!(achieved >= last, "rate {r} went backwards");
            last = achieved;
        }
    }

    #[test]
    fn empty_profile() {
        let p: DecimationProfile<u32> = DecimationProfile::new(Vec::new());
        assert!(p.is_empty());
        assert_eq!(p.select(48_000), None);
        assert_eq!(p.range(), None);
    }
}
