//! DiscoveryCadence - 直近の収穫量から次の discovery 間隔を決める

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::CadenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceTier {
    High,
    Normal,
    Low,
    Idle,
}

#[derive(Debug, Clone)]
pub struct DiscoveryCadence {
    config: CadenceConfig,
    recent: VecDeque<usize>,
    zero_streak: u32,
}

impl DiscoveryCadence {
    pub fn new(config: CadenceConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.window.max(1)),
            config,
            zero_streak: 0,
        }
    }

    /// Record how many postings one discovery run inserted.
    pub fn record(&mut self, inserted: usize) {
        if self.recent.len() >= self.config.window.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(inserted);
        self.zero_streak = if inserted == 0 {
            self.zero_streak.saturating_add(1)
        } else {
            0
        };
    }

    pub fn tier(&self) -> CadenceTier {
        if self.zero_streak >= self.config.idle_after {
            return CadenceTier::Idle;
        }
        if self.zero_streak >= self.config.low_after {
            return CadenceTier::Low;
        }
        if self.recent.is_empty() {
            return CadenceTier::Normal;
        }
        let avg = self.recent.iter().sum::<usize>() as f64 / self.recent.len() as f64;
        if avg >= self.config.high_yield_avg {
            CadenceTier::High
        } else {
            CadenceTier::Normal
        }
    }

    pub fn next_interval(&self) -> Duration {
        match self.tier() {
            CadenceTier::High => self.config.high,
            CadenceTier::Normal => self.config.normal,
            CadenceTier::Low => self.config.low,
            CadenceTier::Idle => self.config.idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::fresh(&[], CadenceTier::Normal, 5 * 60)]
    #[case::busy(&[8, 6, 5], CadenceTier::High, 3 * 60)]
    #[case::modest(&[2, 3, 1], CadenceTier::Normal, 5 * 60)]
    #[case::drying_up(&[9, 0, 0, 0], CadenceTier::Low, 10 * 60)]
    #[case::idle(&[0, 0, 0, 0, 0, 0], CadenceTier::Idle, 15 * 60)]
    #[case::recovers(&[0, 0, 0, 0, 0, 0, 7], CadenceTier::Normal, 5 * 60)]
    fn tiers(#[case] yields: &[usize], #[case] tier: CadenceTier, #[case] secs: u64) {
        let mut cadence = DiscoveryCadence::new(CadenceConfig::default());
        for &y in yields {
            cadence.record(y);
        }
        assert_eq!(cadence.tier(), tier);
        assert_eq!(cadence.next_interval(), Duration::from_secs(secs));
    }
}
