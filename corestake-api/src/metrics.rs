use corestake_execution::queries::pool_info;
use corestake_service::NodeState;
use corestake_types::fixed::WAD;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub op: String,
    pub result: String,
}

pub struct Metrics {
    registry: Registry,
    operations: Family<OperationLabels, Counter>,
    total_shares: Gauge<f64, AtomicU64>,
    share_price: Gauge<f64, AtomicU64>,
    total_value_usd: Gauge<f64, AtomicU64>,
    delegated_core: Gauge<f64, AtomicU64>,
    queued_withdrawals: Gauge,
    sequence: Gauge,
}

fn wad_to_f64(value: u128) -> f64 {
    value as f64 / WAD as f64
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("corestake");
        let operations = Family::<OperationLabels, Counter>::default();
        let total_shares = Gauge::<f64, AtomicU64>::default();
        let share_price = Gauge::<f64, AtomicU64>::default();
        let total_value_usd = Gauge::<f64, AtomicU64>::default();
        let delegated_core = Gauge::<f64, AtomicU64>::default();
        let queued_withdrawals: Gauge = Gauge::default();
        let sequence: Gauge = Gauge::default();

        registry.register("operations", "Operations submitted through the API", operations.clone());
        registry.register("total_shares", "Outstanding pool shares", total_shares.clone());
        registry.register("share_price_usd", "USD value of one share", share_price.clone());
        registry.register("total_value_usd", "Marked-to-market pool value", total_value_usd.clone());
        registry.register("delegated_core", "CORE delegated to validators", delegated_core.clone());
        registry.register("queued_withdrawals", "Pending withdrawal requests", queued_withdrawals.clone());
        registry.register("sequence", "Committed operations", sequence.clone());

        Self {
            registry,
            operations,
            total_shares,
            share_price,
            total_value_usd,
            delegated_core,
            queued_withdrawals,
            sequence,
        }
    }

    pub fn record_operation(&self, op: &str, ok: bool) {
        self.operations
            .get_or_create(&OperationLabels {
                op: op.to_string(),
                result: if ok { "ok" } else { "rejected" }.to_string(),
            })
            .inc();
    }

    /// Refreshes the pool gauges and renders the text exposition.
    pub fn render(&self, node: &NodeState, now: u64) -> Result<String, std::fmt::Error> {
        let engine = &node.engine;
        self.total_shares.set(wad_to_f64(engine.pool.total_shares));
        self.delegated_core
            .set(wad_to_f64(engine.validators.total_delegated()));
        self.queued_withdrawals.set(engine.withdrawals.len() as i64);
        self.sequence.set(engine.sequence as i64);
        // Pricing can fail on stale quotes; the gauges keep their last value.
        if let Ok(info) = pool_info(engine, &node.oracle, now) {
            self.share_price.set(wad_to_f64(info.share_price));
            self.total_value_usd.set(wad_to_f64(info.total_value));
        }

        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}
