//! Compute-unit cost accounting (spec §4.3).
//!
//! Tracks per-endpoint compute-unit spend for a provider session using the
//! provider's documented batch-cost formula, `ceil(n^0.8 * base_cu)`, and
//! reports session summaries the Scheduler logs on each tick.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub enum EndpointCost {
    /// Flat per-item cost; used by endpoints with no batch discount.
    PerItem(u64),
    /// Batch endpoint with a diminishing-returns cost curve and a hard cap
    /// on items per call.
    Batch { base_cu: u64, n_max: usize },
}

#[derive(Debug, Default)]
struct EndpointUsage {
    total_cu: u64,
    calls: u64,
}

#[derive(Debug, Default)]
struct SessionCosts {
    total_cu: u64,
    total_requests: u64,
    batch_savings_cu: u64,
    by_endpoint: HashMap<String, EndpointUsage>,
}

#[derive(Debug, Clone)]
pub struct TopCostEndpoint {
    pub endpoint: String,
    pub total_cu: u64,
    pub calls: u64,
    pub avg_cu_per_call: f64,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub total_cu: u64,
    pub total_requests: u64,
    pub avg_cu_per_request: f64,
    pub batch_savings_cu: u64,
    pub batch_efficiency_pct: f64,
    pub top_cost_endpoints: Vec<TopCostEndpoint>,
}

#[derive(Debug, Clone)]
pub struct MonthlyEstimate {
    pub daily_cu: u64,
    pub monthly_cu: u64,
    pub monthly_cost_usd: f64,
    pub cost_per_day_usd: f64,
}

/// Tracks spend against a catalog of named endpoint costs for one provider.
pub struct CostMeter {
    catalog: HashMap<String, EndpointCost>,
    default_per_item: u64,
    session: Mutex<SessionCosts>,
}

impl CostMeter {
    pub fn new(catalog: HashMap<String, EndpointCost>) -> Self {
        Self {
            catalog,
            default_per_item: 10,
            session: Mutex::new(SessionCosts::default()),
        }
    }

    fn individual_cost(&self, endpoint: &str) -> u64 {
        match self.catalog.get(endpoint) {
            Some(EndpointCost::PerItem(cu)) => *cu,
            // A single-item equivalent for a batch endpoint is estimated as
            // double the batch base cost, matching the reference calculator.
            Some(EndpointCost::Batch { base_cu, .. }) => base_cu * 2,
            None => self.default_per_item,
        }
    }

    /// `ceil(n^0.8 * base_cu)`, clamped so `n` never exceeds the endpoint's
    /// documented batch cap.
    pub fn batch_cost(&self, endpoint: &str, num_items: usize) -> u64 {
        match self.catalog.get(endpoint) {
            Some(EndpointCost::Batch { base_cu, n_max }) => {
                let n = num_items.min(*n_max).max(1) as f64;
                (n.powf(0.8) * (*base_cu as f64)).ceil() as u64
            }
            Some(EndpointCost::PerItem(cu)) => cu * num_items as u64,
            None => self.default_per_item * num_items as u64,
        }
    }

    /// Records a call and returns the compute units it consumed.
    pub fn track_call(&self, endpoint: &str, num_items: usize, is_batch: bool) -> u64 {
        let cost = if is_batch && num_items > 1 {
            let batched = self.batch_cost(endpoint, num_items);
            let individual_equivalent = self.individual_cost(endpoint) * num_items as u64;
            let savings = individual_equivalent.saturating_sub(batched);
            self.session.lock().batch_savings_cu += savings;
            batched
        } else {
            self.individual_cost(endpoint) * num_items.max(1) as u64
        };

        let mut session = self.session.lock();
        session.total_cu += cost;
        session.total_requests += 1;
        let usage = session.by_endpoint.entry(endpoint.to_string()).or_default();
        usage.total_cu += cost;
        usage.calls += 1;

        cost
    }

    /// Splits `total_items` into batches no larger than the endpoint's
    /// `n_max`, greedily filling each batch to the cap.
    pub fn optimal_batch_sizes(&self, endpoint: &str, total_items: usize) -> Vec<usize> {
        match self.catalog.get(endpoint) {
            Some(EndpointCost::Batch { n_max, .. }) => {
                if total_items <= *n_max {
                    return vec![total_items];
                }
                let mut batches = Vec::new();
                let mut remaining = total_items;
                while remaining > 0 {
                    let size = remaining.min(*n_max);
                    batches.push(size);
                    remaining -= size;
                }
                batches
            }
            _ => vec![1; total_items],
        }
    }

    pub fn session_summary(&self) -> SessionSummary {
        let session = self.session.lock();
        let avg_cu_per_request = if session.total_requests == 0 {
            0.0
        } else {
            session.total_cu as f64 / session.total_requests as f64
        };
        let batch_efficiency_pct = if session.total_cu == 0 {
            0.0
        } else {
            session.batch_savings_cu as f64 / session.total_cu as f64 * 100.0
        };

        let mut ranked: Vec<TopCostEndpoint> = session
            .by_endpoint
            .iter()
            .map(|(endpoint, usage)| TopCostEndpoint {
                endpoint: endpoint.clone(),
                total_cu: usage.total_cu,
                calls: usage.calls,
                avg_cu_per_call: usage.total_cu as f64 / usage.calls.max(1) as f64,
            })
            .collect();
        ranked.sort_by(|a, b| b.total_cu.cmp(&a.total_cu));
        ranked.truncate(5);

        SessionSummary {
            total_cu: session.total_cu,
            total_requests: session.total_requests,
            avg_cu_per_request,
            batch_savings_cu: session.batch_savings_cu,
            batch_efficiency_pct,
            top_cost_endpoints: ranked,
        }
    }

    pub fn reset_session(&self) {
        *self.session.lock() = SessionCosts::default();
    }

    pub fn estimate_monthly_cost(&self, daily_cu: u64, price_per_million_cu: f64) -> MonthlyEstimate {
        let monthly_cu = daily_cu * 30;
        let monthly_cost_usd = (monthly_cu as f64 / 1_000_000.0) * price_per_million_cu;
        MonthlyEstimate {
            daily_cu,
            monthly_cu,
            monthly_cost_usd,
            cost_per_day_usd: monthly_cost_usd / 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> CostMeter {
        let mut catalog = HashMap::new();
        catalog.insert("/defi/price".to_string(), EndpointCost::PerItem(10));
        catalog.insert(
            "/defi/multi_price".to_string(),
            EndpointCost::Batch { base_cu: 5, n_max: 100 },
        );
        CostMeter::new(catalog)
    }

    #[test]
    fn batch_cost_matches_formula() {
        let meter = meter();
        // ceil(10^0.8 * 5) = ceil(31.547...) = 32
        assert_eq!(meter.batch_cost("/defi/multi_price", 10), 32);
    }

    #[test]
    fn batch_cost_clamps_at_n_max() {
        let meter = meter();
        let clamped = meter.batch_cost("/defi/multi_price", 500);
        let at_cap = meter.batch_cost("/defi/multi_price", 100);
        assert_eq!(clamped, at_cap);
    }

    #[test]
    fn unknown_endpoint_uses_default_per_item_cost() {
        let meter = meter();
        assert_eq!(meter.batch_cost("/defi/unknown", 3), 30);
    }

    #[test]
    fn track_call_accumulates_session_totals() {
        let meter = meter();
        meter.track_call("/defi/price", 1, false);
        meter.track_call("/defi/price", 1, false);
        let summary = meter.session_summary();
        assert_eq!(summary.total_cu, 20);
        assert_eq!(summary.total_requests, 2);
    }

    #[test]
    fn batch_call_tracks_savings_over_individual_cost() {
        let meter = meter();
        meter.track_call("/defi/multi_price", 10, true);
        let summary = meter.session_summary();
        // individual-equivalent = 10 * (5*2) = 100, batch = 32, savings = 68
        assert_eq!(summary.batch_savings_cu, 68);
    }

    #[test]
    fn optimal_batch_sizes_splits_on_n_max() {
        let meter = meter();
        let batches = meter.optimal_batch_sizes("/defi/multi_price", 250);
        assert_eq!(batches, vec![100, 100, 50]);
    }

    #[test]
    fn reset_session_clears_totals() {
        let meter = meter();
        meter.track_call("/defi/price", 1, false);
        meter.reset_session();
        assert_eq!(meter.session_summary().total_requests, 0);
    }
}
