use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::MetricId;

/// Running min/max/sum over u64 samples (time ticks, byte counts).
/// `Default` is the empty accumulator and the identity for `+=`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinMaxSum {
    pub min: u64,
    pub max: u64,
    pub sum: u64,
}

impl Default for MinMaxSum {
    fn default() -> Self {
        Self {
            min: u64::MAX,
            max: 0,
            sum: 0,
        }
    }
}

impl MinMaxSum {
    /// Accumulator holding a single sample.
    pub fn sample(value: u64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

impl AddAssign for MinMaxSum {
    fn add_assign(&mut self, rhs: Self) {
        self.min = self.min.min(rhs.min);
        self.max = self.max.max(rhs.max);
        self.sum += rhs.sum;
    }
}

/// Invocation count plus inclusive/exclusive durations for one call
/// path. Exclusive time is computed upstream by the trace reader's call
/// stack; this type only accumulates what it is given.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionStats {
    pub count: u64,
    pub incl: MinMaxSum,
    pub excl: MinMaxSum,
}

impl FunctionStats {
    /// Stats for a single completed invocation.
    pub fn invocation(incl: u64, excl: u64) -> Self {
        Self {
            count: 1,
            incl: MinMaxSum::sample(incl),
            excl: MinMaxSum::sample(excl),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl AddAssign for FunctionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.count += rhs.count;
        self.incl += rhs.incl;
        self.excl += rhs.excl;
    }
}

/// Point-to-point message counters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub send_count: u64,
    pub recv_count: u64,
    pub send_bytes: u64,
    pub recv_bytes: u64,
}

impl MessageStats {
    pub fn send(bytes: u64) -> Self {
        Self {
            send_count: 1,
            send_bytes: bytes,
            ..Default::default()
        }
    }

    pub fn recv(bytes: u64) -> Self {
        Self {
            recv_count: 1,
            recv_bytes: bytes,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.send_count == 0 && self.recv_count == 0
    }
}

impl AddAssign for MessageStats {
    fn add_assign(&mut self, rhs: Self) {
        self.send_count += rhs.send_count;
        self.recv_count += rhs.recv_count;
        self.send_bytes += rhs.send_bytes;
        self.recv_bytes += rhs.recv_bytes;
    }
}

/// Collective operation counters (barrier, broadcast, reduce, ...).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollopStats {
    pub count: u64,
    pub send_bytes: u64,
    pub recv_bytes: u64,
}

impl CollopStats {
    pub fn op(send_bytes: u64, recv_bytes: u64) -> Self {
        Self {
            count: 1,
            send_bytes,
            recv_bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl AddAssign for CollopStats {
    fn add_assign(&mut self, rhs: Self) {
        self.count += rhs.count;
        self.send_bytes += rhs.send_bytes;
        self.recv_bytes += rhs.recv_bytes;
    }
}

/// One metric's running value, inclusive and exclusive of callees.
/// Writes through `CallPathFrame::set_metric` replace the whole value
/// (metric samples are instantaneous, not cumulative); `+=` is only
/// used when folding locations together and adds matching variants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum MetricStats {
    Unsigned { incl: u64, excl: u64 },
    Signed { incl: i64, excl: i64 },
    Float { incl: f64, excl: f64 },
}

impl AddAssign for MetricStats {
    fn add_assign(&mut self, rhs: Self) {
        use MetricStats::*;
        match (&mut *self, rhs) {
            (Unsigned { incl, excl }, Unsigned { incl: i, excl: e }) => {
                *incl += i;
                *excl += e;
            }
            (Signed { incl, excl }, Signed { incl: i, excl: e }) => {
                *incl += i;
                *excl += e;
            }
            (Float { incl, excl }, Float { incl: i, excl: e }) => {
                *incl += i;
                *excl += e;
            }
            // metric changed representation mid-stream, keep the newer one
            (lhs, rhs) => *lhs = rhs,
        }
    }
}

/// Everything one location recorded at one call-path node.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NodeData {
    pub function: FunctionStats,
    pub message: MessageStats,
    pub collop: CollopStats,
    pub metrics: BTreeMap<MetricId, MetricStats>,
}

impl AddAssign<&NodeData> for NodeData {
    fn add_assign(&mut self, rhs: &NodeData) {
        self.function += rhs.function;
        self.message += rhs.message;
        self.collop += rhs.collop;
        for (&id, &value) in &rhs.metrics {
            match self.metrics.get_mut(&id) {
                Some(mine) => *mine += value,
                None => {
                    self.metrics.insert(id, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_sum() {
        let mut acc = MinMaxSum::default();
        assert!(acc.is_empty());

        acc += MinMaxSum::sample(10);
        acc += MinMaxSum::sample(3);
        acc += MinMaxSum::sample(7);
        assert_eq!(acc, MinMaxSum { min: 3, max: 10, sum: 20 });

        // identity on either side
        let mut lhs = MinMaxSum::default();
        lhs += acc;
        assert_eq!(lhs, acc);
        acc += MinMaxSum::default();
        assert_eq!(acc, MinMaxSum { min: 3, max: 10, sum: 20 });
    }

    #[test]
    fn test_function_stats_commutative() {
        let a = FunctionStats {
            count: 3,
            incl: MinMaxSum::sample(30),
            excl: MinMaxSum::sample(10),
        };
        let b = FunctionStats {
            count: 2,
            incl: MinMaxSum::sample(12),
            excl: MinMaxSum::sample(5),
        };

        let mut ab = a;
        ab += b;
        let mut ba = b;
        ba += a;

        assert_eq!(ab, ba);
        assert_eq!(ab.count, 5);
        assert_eq!(ab.excl.sum, 15);
        assert_eq!(ab.excl.min, 5);
        assert_eq!(ab.excl.max, 10);
    }

    #[test]
    fn test_message_stats() {
        let mut m = MessageStats::default();
        assert!(m.is_empty());
        m += MessageStats::send(100);
        m += MessageStats::send(50);
        m += MessageStats::recv(10);
        assert_eq!(m.send_count, 2);
        assert_eq!(m.send_bytes, 150);
        assert_eq!(m.recv_count, 1);
        assert_eq!(m.recv_bytes, 10);
    }

    #[test]
    fn test_metric_add_matching_variant() {
        let mut m = MetricStats::Unsigned { incl: 5, excl: 2 };
        m += MetricStats::Unsigned { incl: 3, excl: 1 };
        assert_eq!(m, MetricStats::Unsigned { incl: 8, excl: 3 });

        let mut f = MetricStats::Float { incl: 1.5, excl: 0.5 };
        f += MetricStats::Float { incl: 2.5, excl: 1.0 };
        assert_eq!(f, MetricStats::Float { incl: 4.0, excl: 1.5 });
    }

    #[test]
    fn test_metric_add_mismatched_variant() {
        let mut m = MetricStats::Unsigned { incl: 5, excl: 2 };
        m += MetricStats::Signed { incl: -1, excl: -1 };
        assert_eq!(m, MetricStats::Signed { incl: -1, excl: -1 });
    }

    #[test]
    fn test_node_data_fold() {
        let mut a = NodeData::default();
        a.function += FunctionStats::invocation(100, 40);
        a.metrics.insert(7, MetricStats::Unsigned { incl: 10, excl: 4 });

        let mut b = NodeData::default();
        b.function += FunctionStats::invocation(60, 60);
        b.message += MessageStats::send(8);
        b.metrics.insert(7, MetricStats::Unsigned { incl: 1, excl: 1 });
        b.metrics.insert(9, MetricStats::Signed { incl: -2, excl: -2 });

        a += &b;
        assert_eq!(a.function.count, 2);
        assert_eq!(a.function.incl.sum, 160);
        assert_eq!(a.message.send_bytes, 8);
        assert_eq!(a.metrics[&7], MetricStats::Unsigned { incl: 11, excl: 5 });
        assert_eq!(a.metrics[&9], MetricStats::Signed { incl: -2, excl: -2 });
    }
}
