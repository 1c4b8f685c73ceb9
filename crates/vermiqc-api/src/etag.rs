//! ETag computation for sample views.
//!
//! ETags are SHA-256 hashes over the sample's identity, timestamps, and
//! verdict plus the sorted `(measurement_id, recorded_at, classification)`
//! triples of its measurements. Ordering is deterministic regardless of the
//! order measurements were loaded in.

use sha2::{Digest, Sha256};
use vermiqc_core::sample::SampleView;

/// Compute an ETag for `view`. Any attach, upsert, detach, update, or
/// re-seal that changes a classification changes the tag.
pub fn compute_etag(view: &SampleView) -> String {
  let sample = &view.sample;
  let mut hasher = Sha256::new();
  hasher.update(sample.sample_id.as_bytes());
  hasher.update(sample.updated_at.timestamp_micros().to_le_bytes());
  if let Some(sealed_at) = sample.sealed_at {
    hasher.update(sealed_at.timestamp_micros().to_le_bytes());
  }
  hasher.update(sample.verdict.to_string().as_bytes());

  let mut measurements: Vec<_> = view.measurements.iter().collect();
  measurements.sort_by_key(|m| m.measurement_id);
  for m in measurements {
    hasher.update(m.measurement_id.as_bytes());
    hasher.update(m.recorded_at.timestamp_micros().to_le_bytes());
    hasher.update(m.classification.to_string().as_bytes());
  }
  format!("\"{}\"", hex::encode(hasher.finalize()))
}
