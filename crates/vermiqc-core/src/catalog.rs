//! Reference data: products, measurable properties, production lines, and
//! shifts.
//!
//! All entities are identified by a stable, operator-facing code. Only
//! cosmetic fields (names, display order, active flags) change after
//! creation.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result, sample::AnalysisKind};

// ─── Product ─────────────────────────────────────────────────────────────────

/// A saleable vermiculite grade (e.g. "V-MED").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub code:          String,
  pub name:          String,
  #[serde(default)]
  pub display_order: i32,
  #[serde(default = "default_true")]
  pub active:        bool,
}

// ─── Property ────────────────────────────────────────────────────────────────

/// How a property's values are recorded and compared.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
  #[default]
  Numeric,
  Categorical,
}

/// A measurable quantity such as moisture or bulk density.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
  pub code:               String,
  pub name:               String,
  pub unit:               String,
  #[serde(default)]
  pub data_type:          DataType,
  #[serde(default)]
  pub category:           String,
  /// Laboratory method reference, e.g. "ASTM C516".
  #[serde(default)]
  pub test_method:        String,
  #[serde(default)]
  pub display_order:      i32,
  /// A pointwise sample is incomplete without this property.
  #[serde(default)]
  pub required_pointwise: bool,
  /// A composite sample is incomplete without this property.
  #[serde(default)]
  pub required_composite: bool,
}

impl Property {
  pub fn is_required_for(&self, kind: AnalysisKind) -> bool {
    match kind {
      AnalysisKind::Pointwise => self.required_pointwise,
      AnalysisKind::Composite => self.required_composite,
    }
  }
}

// ─── Line and shift ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLine {
  pub code:   String,
  pub name:   String,
  #[serde(default = "default_true")]
  pub active: bool,
}

/// A plant work period. Buckets by shift start at `starts_at` on the sample's
/// declared date, independent of the calendar hour the sample was entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
  pub code:          String,
  pub name:          String,
  pub starts_at:     NaiveTime,
  #[serde(default)]
  pub display_order: i32,
}

fn default_true() -> bool { true }

// ─── Catalog snapshot ────────────────────────────────────────────────────────

/// An in-memory snapshot of all reference data, used to validate
/// submissions in one pass.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  pub products:   BTreeMap<String, Product>,
  pub properties: BTreeMap<String, Property>,
  pub lines:      BTreeMap<String, ProductionLine>,
  pub shifts:     BTreeMap<String, Shift>,
}

impl Catalog {
  pub fn from_parts(
    products: Vec<Product>,
    properties: Vec<Property>,
    lines: Vec<ProductionLine>,
    shifts: Vec<Shift>,
  ) -> Self {
    Self {
      products:   products.into_iter().map(|p| (p.code.clone(), p)).collect(),
      properties: properties
        .into_iter()
        .map(|p| (p.code.clone(), p))
        .collect(),
      lines:      lines.into_iter().map(|l| (l.code.clone(), l)).collect(),
      shifts:     shifts.into_iter().map(|s| (s.code.clone(), s)).collect(),
    }
  }

  pub fn product(&self, code: &str) -> Result<&Product> {
    self
      .products
      .get(code)
      .ok_or_else(|| Error::UnknownProduct(code.to_owned()))
  }

  pub fn property(&self, code: &str) -> Result<&Property> {
    self
      .properties
      .get(code)
      .ok_or_else(|| Error::UnknownProperty(code.to_owned()))
  }

  pub fn line(&self, code: &str) -> Result<&ProductionLine> {
    self
      .lines
      .get(code)
      .ok_or_else(|| Error::UnknownLine(code.to_owned()))
  }

  pub fn shift(&self, code: &str) -> Result<&Shift> {
    self
      .shifts
      .get(code)
      .ok_or_else(|| Error::UnknownShift(code.to_owned()))
  }

  /// Codes of the properties a sample of `kind` must carry to be complete,
  /// in display order.
  pub fn required_properties(&self, kind: AnalysisKind) -> Vec<String> {
    let mut required: Vec<&Property> = self
      .properties
      .values()
      .filter(|p| p.is_required_for(kind))
      .collect();
    required.sort_by_key(|p| (p.display_order, p.code.clone()));
    required.into_iter().map(|p| p.code.clone()).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn property(code: &str, order: i32, pointwise: bool) -> Property {
    Property {
      code:               code.into(),
      name:               code.into(),
      unit:               "%".into(),
      data_type:          DataType::Numeric,
      category:           "fisico".into(),
      test_method:        String::new(),
      display_order:      order,
      required_pointwise: pointwise,
      required_composite: true,
    }
  }

  #[test]
  fn unknown_codes_map_to_typed_errors() {
    let catalog = Catalog::default();
    assert_eq!(catalog.product("V-MED").unwrap_err().code(), "unknown_product");
    assert_eq!(catalog.line("L9").unwrap_err().code(), "unknown_line");
    assert_eq!(catalog.shift("D").unwrap_err().code(), "unknown_shift");
    assert_eq!(
      catalog.property("UMIDADE").unwrap_err().code(),
      "unknown_property"
    );
  }

  #[test]
  fn required_properties_follow_kind_and_display_order() {
    let catalog = Catalog::from_parts(
      vec![],
      vec![
        property("DENSIDADE", 2, false),
        property("UMIDADE", 1, true),
        property("GRANULOMETRIA", 3, true),
      ],
      vec![],
      vec![],
    );
    assert_eq!(
      catalog.required_properties(AnalysisKind::Pointwise),
      vec!["UMIDADE", "GRANULOMETRIA"]
    );
    assert_eq!(
      catalog.required_properties(AnalysisKind::Composite),
      vec!["UMIDADE", "DENSIDADE", "GRANULOMETRIA"]
    );
  }
}
