//! Trend Analyzer (spec §4.9): classifies a multi-window volume or
//! transaction-count sample into a `TrendClass` + score, plus an
//! acceleration percentage for volume samples. Grounded almost line-for-line
//! on `original_source/services/trend_analysis_service.py`'s
//! `analyze_volume_trend`/`analyze_transaction_trend`, which share one
//! classification ladder differing only in which metric feeds it.

use crate::model::TrendClass;

/// Three-horizon sample for either volume or (buy+sell) transaction counts.
#[derive(Debug, Clone, Copy)]
pub struct TrendSample {
    pub h1: f64,
    pub h6: f64,
    pub h24: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendResult {
    pub class: TrendClass,
    pub score: f64,
    pub acceleration_pct: f64,
}

#[derive(Default)]
pub struct TrendAnalyzer;

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, sample: TrendSample) -> TrendResult {
        let TrendSample { h1, h6, h24 } = sample;

        let h1_avg = h1;
        let h1_to_h6_avg = if h6 > h1 { (h6 - h1) / 5.0 } else { 0.0 };
        let h6_to_h24_avg = if h24 > h6 { (h24 - h6) / 18.0 } else { 0.0 };

        let (class, score) = if h1 == 0.0 && h6 == 0.0 && h24 == 0.0 {
            (TrendClass::NoActivity, 0.0)
        } else if h1_avg > 0.0 && h1_avg >= h1_to_h6_avg && h1_to_h6_avg >= h6_to_h24_avg {
            if h6_to_h24_avg > 0.0 {
                (TrendClass::StronglyIncreasing, 1.0)
            } else if h1_to_h6_avg > 0.0 {
                (TrendClass::Increasing, 0.8)
            } else {
                (TrendClass::RecentlyIncreasing, 0.6)
            }
        } else if h1_avg > h1_to_h6_avg && h1_to_h6_avg > 0.0 {
            (TrendClass::Increasing, 0.7)
        } else if h1_avg > 0.0 && h1_avg > h6_to_h24_avg {
            (TrendClass::RecentlyIncreasing, 0.5)
        } else if h24 > 0.0 && (h1_avg - h24 / 24.0).abs() < (h24 / 24.0 * 0.2) {
            (TrendClass::Stable, 0.4)
        } else if h1 < h1_to_h6_avg || h1 < h6_to_h24_avg {
            if h1 < h1_to_h6_avg && h1_to_h6_avg < h6_to_h24_avg {
                (TrendClass::StronglyDecreasing, 0.1)
            } else {
                (TrendClass::Decreasing, 0.2)
            }
        } else {
            (TrendClass::InsufficientData, 0.05)
        };

        let acceleration_pct = if h1_to_h6_avg > 0.0 {
            (h1_avg / h1_to_h6_avg - 1.0) * 100.0
        } else if h1_avg > 0.0 && h6_to_h24_avg > 0.0 {
            (h1_avg / h6_to_h24_avg - 1.0) * 100.0
        } else if h1_avg > 0.0 {
            100.0
        } else {
            0.0
        };

        TrendResult {
            class,
            score,
            acceleration_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_activity_when_all_windows_zero() {
        let result = TrendAnalyzer::new().analyze(TrendSample { h1: 0.0, h6: 0.0, h24: 0.0 });
        assert_eq!(result.class, TrendClass::NoActivity);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn strongly_increasing_when_accelerating_each_window() {
        let result = TrendAnalyzer::new().analyze(TrendSample {
            h1: 20_000.0,
            h6: 80_000.0,
            h24: 200_000.0,
        });
        assert_eq!(result.class, TrendClass::StronglyIncreasing);
        assert!(result.score >= 0.8);
    }

    #[test]
    fn stable_when_near_flat_hourly_rate() {
        let result = TrendAnalyzer::new().analyze(TrendSample {
            h1: 900.0,
            h6: 6_000.0,
            h24: 24_000.0,
        });
        assert_eq!(result.class, TrendClass::Stable);
    }

    #[test]
    fn strongly_decreasing_when_activity_collapses() {
        let result = TrendAnalyzer::new().analyze(TrendSample {
            h1: 100.0,
            h6: 1_000.0,
            h24: 50_000.0,
        });
        assert_eq!(result.class, TrendClass::StronglyDecreasing);
    }

    #[test]
    fn acceleration_is_zero_with_no_activity() {
        let result = TrendAnalyzer::new().analyze(TrendSample { h1: 0.0, h6: 0.0, h24: 0.0 });
        assert_eq!(result.acceleration_pct, 0.0);
    }

    #[test]
    fn acceleration_is_full_growth_when_only_h1_has_activity() {
        let result = TrendAnalyzer::new().analyze(TrendSample { h1: 500.0, h6: 0.0, h24: 0.0 });
        assert_eq!(result.acceleration_pct, 100.0);
    }
}
