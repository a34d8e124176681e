//! Deterministic record-set construction.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tether_store::{RowKey, RowValue};

/// Shape of the generated record set.
#[derive(Clone, Copy, Debug)]
pub struct DatasetSpec {
    pub records: u64,
    pub items_per_record: u64,
    pub payload_bytes: usize,
    pub seed: u64,
}

/// One unit of data to write; immutable once built.
#[derive(Clone, Debug)]
pub struct Record {
    pub key: RowKey,
    pub value: RowValue,
}

/// Builds `spec.records` records with keys `0..records` in order and
/// payloads that are deterministic for the seed.
pub fn build_records(spec: &DatasetSpec) -> Vec<Record> {
    let mut rng = SmallRng::seed_from_u64(spec.seed);
    let mut out = Vec::with_capacity(spec.records as usize);
    for key in 0..spec.records {
        let mut value = RowValue::new();
        for id in 0..spec.items_per_record {
            let mut payload = vec![0u8; spec.payload_bytes];
            rng.fill(&mut payload[..]);
            value.insert(id, Bytes::from(payload));
        }
        out.push(Record { key, value });
    }
    out
}
