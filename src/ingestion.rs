// =============================================================================
// Ingestion Buffer — per-symbol bounded tick history
// =============================================================================
//
// Thread-safe ring buffer per symbol, modeled on `market_data::CandleBuffer`:
// one `RwLock<HashMap<...>>` guarding a `VecDeque` per key, oldest-evict on
// overflow. Concurrent-safe append/read; all reads return owned copies so
// callers never hold a reference into the buffer's lock.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tracing::debug;

use crate::types::Tick;

/// Per-symbol statistics surface (supplemented feature, see SPEC_FULL.md).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BufferStats {
    pub symbol: String,
    pub buffer_size: usize,
    pub total_ticks: u64,
    pub last_price: Option<f64>,
    pub last_trade_time_ms: Option<i64>,
}

struct SymbolBuffer {
    ticks: VecDeque<Tick>,
    capacity: usize,
    total_ingested: u64,
}

impl SymbolBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            ticks: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            total_ingested: 0,
        }
    }

    fn push(&mut self, tick: Tick) {
        self.ticks.push_back(tick);
        self.total_ingested += 1;
        while self.ticks.len() > self.capacity {
            self.ticks.pop_front();
        }
    }
}

/// Bounded, concurrent-safe ingestion buffer across all tracked symbols.
pub struct IngestionBuffer {
    buffers: RwLock<HashMap<String, SymbolBuffer>>,
    capacity: usize,
}

impl IngestionBuffer {
    /// `capacity` is the per-symbol bound (default 10 000, per spec §6).
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Append a tick under the per-buffer lock. Size never exceeds `capacity`
    /// after this call, and `tick` is always the last element.
    pub fn ingest(&self, tick: Tick) {
        let mut map = self.buffers.write();
        let buf = map
            .entry(tick.symbol.clone())
            .or_insert_with(|| SymbolBuffer::new(self.capacity));
        buf.push(tick.clone());
        if buf.total_ingested % 1000 == 0 {
            debug!(symbol = %tick.symbol, count = buf.total_ingested, "ticks ingested");
        }
    }

    /// Return the latest `k` ticks (oldest-first), an owned copy.
    pub fn latest_n(&self, symbol: &str, k: usize) -> Vec<Tick> {
        let map = self.buffers.read();
        match map.get(symbol) {
            Some(buf) => {
                let len = buf.ticks.len();
                let start = len.saturating_sub(k);
                buf.ticks.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Return all buffered ticks (oldest-first), an owned copy.
    pub fn all(&self, symbol: &str) -> Vec<Tick> {
        let map = self.buffers.read();
        map.get(symbol)
            .map(|buf| buf.ticks.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Return ticks with `t0 <= trade_time_ms <= t1`.
    pub fn range(&self, symbol: &str, t0: i64, t1: i64) -> Vec<Tick> {
        let map = self.buffers.read();
        map.get(symbol)
            .map(|buf| {
                buf.ticks
                    .iter()
                    .filter(|t| t.trade_time_ms >= t0 && t.trade_time_ms <= t1)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent price for a symbol, or `None` if no ticks have arrived.
    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        let map = self.buffers.read();
        map.get(symbol).and_then(|buf| buf.ticks.back()).map(|t| t.price)
    }

    /// Latest price for every symbol that has at least one tick.
    pub fn latest_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        let map = self.buffers.read();
        symbols
            .iter()
            .filter_map(|s| {
                map.get(s)
                    .and_then(|buf| buf.ticks.back())
                    .map(|t| (s.clone(), t.price))
            })
            .collect()
    }

    /// Per-symbol buffer statistics (supplemented feature).
    pub fn stats(&self, symbol: &str) -> Option<BufferStats> {
        let map = self.buffers.read();
        map.get(symbol).map(|buf| BufferStats {
            symbol: symbol.to_string(),
            buffer_size: buf.ticks.len(),
            total_ticks: buf.total_ingested,
            last_price: buf.ticks.back().map(|t| t.price),
            last_trade_time_ms: buf.ticks.back().map(|t| t.trade_time_ms),
        })
    }

    pub fn all_stats(&self) -> Vec<BufferStats> {
        let map = self.buffers.read();
        map.iter()
            .map(|(symbol, buf)| BufferStats {
                symbol: symbol.clone(),
                buffer_size: buf.ticks.len(),
                total_ticks: buf.total_ingested,
                last_price: buf.ticks.back().map(|t| t.price),
                last_trade_time_ms: buf.ticks.back().map(|t| t.trade_time_ms),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, price: f64, t: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            quantity: 1.0,
            trade_time_ms: t,
        }
    }

    #[test]
    fn ingest_respects_capacity_oldest_evict() {
        let buf = IngestionBuffer::new(3);
        for i in 0..5 {
            buf.ingest(tick("BTCUSDT", 100.0 + i as f64, i * 1000));
        }
        let all = buf.all("BTCUSDT");
        assert_eq!(all.len(), 3);
        assert_eq!(all.first().unwrap().price, 102.0);
        assert_eq!(all.last().unwrap().price, 104.0);
    }

    #[test]
    fn latest_n_returns_most_recent() {
        let buf = IngestionBuffer::new(10);
        for i in 0..5 {
            buf.ingest(tick("ETHUSDT", i as f64, i * 1000));
        }
        let latest = buf.latest_n("ETHUSDT", 2);
        assert_eq!(latest.iter().map(|t| t.price).collect::<Vec<_>>(), vec![3.0, 4.0]);
    }

    #[test]
    fn latest_price_absent_for_unknown_symbol() {
        let buf = IngestionBuffer::new(10);
        assert_eq!(buf.latest_price("XRPUSDT"), None);
    }

    #[test]
    fn range_filters_by_trade_time() {
        let buf = IngestionBuffer::new(10);
        for i in 0..5 {
            buf.ingest(tick("BTCUSDT", i as f64, i * 1000));
        }
        let ranged = buf.range("BTCUSDT", 1000, 3000);
        assert_eq!(ranged.len(), 3);
    }

    #[test]
    fn size_equals_min_of_count_and_capacity() {
        let buf = IngestionBuffer::new(5);
        for i in 0..3 {
            buf.ingest(tick("BTCUSDT", i as f64, i));
        }
        assert_eq!(buf.all("BTCUSDT").len(), 3);
        for i in 3..10 {
            buf.ingest(tick("BTCUSDT", i as f64, i));
        }
        assert_eq!(buf.all("BTCUSDT").len(), 5);
    }
}
