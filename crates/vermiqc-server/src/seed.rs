//! Startup seed: reference data and specifications from a TOML file.
//!
//! ```toml
//! [[products]]
//! code = "V-MED"
//! name = "Vermiculita média"
//!
//! [[shifts]]
//! code = "A"
//! name = "Turno A"
//! starts_at = "06:00:00"
//!
//! [[specifications]]
//! product = "V-MED"
//! property = "UMIDADE"
//! effective_from = "2024-01-01T00:00:00Z"
//! limits = { type = "numeric", lsl = "0", lwl = "2", uwl = "8", usl = "10" }
//! ```
//!
//! Applying a seed is idempotent: catalog entries are upserts, and a
//! specification already on record is skipped instead of opening a new
//! version.

use std::path::Path;

use serde::Deserialize;
use vermiqc_core::{
  DomainError,
  catalog::{Product, ProductionLine, Property, Shift},
  specification::NewSpecification,
  store::QcStore,
};

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
  #[serde(default)]
  pub products:       Vec<Product>,
  #[serde(default)]
  pub properties:     Vec<Property>,
  #[serde(default)]
  pub lines:          Vec<ProductionLine>,
  #[serde(default)]
  pub shifts:         Vec<Shift>,
  #[serde(default)]
  pub specifications: Vec<NewSpecification>,
}

/// What [`Seed::apply`] did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
  pub catalog_entries:         usize,
  pub specifications_recorded: usize,
  pub specifications_skipped:  usize,
}

impl Seed {
  pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(input)
  }

  pub async fn load(path: &Path) -> anyhow::Result<Self> {
    use anyhow::Context as _;
    let text = tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read seed file {path:?}"))?;
    Self::from_toml(&text)
      .with_context(|| format!("failed to parse seed file {path:?}"))
  }

  pub async fn apply<S: QcStore>(
    &self,
    store: &S,
  ) -> Result<SeedSummary, S::Error> {
    let mut summary = SeedSummary::default();

    for product in &self.products {
      store.upsert_product(product.clone()).await?;
      summary.catalog_entries += 1;
    }
    for property in &self.properties {
      store.upsert_property(property.clone()).await?;
      summary.catalog_entries += 1;
    }
    for line in &self.lines {
      store.upsert_line(line.clone()).await?;
      summary.catalog_entries += 1;
    }
    for shift in &self.shifts {
      store.upsert_shift(shift.clone()).await?;
      summary.catalog_entries += 1;
    }

    for spec in &self.specifications {
      let history = store
        .specification_history(spec.product.clone(), spec.property.clone())
        .await?;
      let recorded = match spec.effective_from {
        Some(from) => history.iter().any(|s| s.effective_from == from),
        None => history
          .first()
          .is_some_and(|s| s.effective_to.is_none() && s.limits == spec.limits),
      };
      if recorded {
        summary.specifications_skipped += 1;
        continue;
      }

      match store.upsert_specification(spec.clone()).await {
        Ok(_) => summary.specifications_recorded += 1,
        Err(e)
          if e.as_domain().is_some_and(|d| d.code() == "invalid_effective_from") =>
        {
          tracing::warn!(
            product = %spec.product,
            property = %spec.property,
            "seed specification predates the active one; skipped"
          );
          summary.specifications_skipped += 1;
        }
        Err(e) => return Err(e),
      }
    }

    tracing::info!(
      catalog = summary.catalog_entries,
      specifications = summary.specifications_recorded,
      skipped = summary.specifications_skipped,
      "seed applied"
    );
    Ok(summary)
  }
}
