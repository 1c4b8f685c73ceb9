//! Error types for `vermiqc-core`.
//!
//! Every variant has a stable machine code ([`Error::code`]) and a localized
//! user-facing message ([`Error::localized`]). `Display` renders English.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid specification bounds: {0}")]
  InvalidBounds(String),

  #[error(
    "specification for {product}/{property} must take effect after the \
     active one"
  )]
  InvalidEffectiveFrom { product: String, property: String },

  #[error("sample already exists: {0}")]
  DuplicateSample(String),

  #[error("property {property} already measured on this sample")]
  DuplicateMeasurement { sample_id: Option<Uuid>, property: String },

  #[error("unknown product: {0}")]
  UnknownProduct(String),

  #[error("unknown property: {0}")]
  UnknownProperty(String),

  #[error("unknown production line: {0}")]
  UnknownLine(String),

  #[error("unknown shift: {0}")]
  UnknownShift(String),

  #[error("invalid value {value:?} for {property}: {reason}")]
  InvalidMeasurement {
    property: String,
    value:    String,
    reason:   String,
  },

  #[error("invalid sample field {field}: {reason}")]
  InvalidSample { field: String, reason: String },

  #[error("no active specification for {product}/{property}")]
  StaleSpecification { product: String, property: String },

  #[error("backend unavailable: {0}")]
  BackendUnavailable(String),

  #[error("sample not found: {0}")]
  SampleNotFound(Uuid),

  #[error("measurement not found: {0}")]
  MeasurementNotFound(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Locale ──────────────────────────────────────────────────────────────────

/// Language for user-visible messages.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum Locale {
  #[default]
  #[serde(rename = "en")]
  En,
  #[serde(rename = "pt-BR")]
  PtBr,
}

impl Locale {
  /// Pick a locale from an `Accept-Language`-style tag; anything starting
  /// with `pt` maps to Portuguese.
  pub fn from_tag(tag: &str) -> Option<Self> {
    let tag = tag.trim().to_ascii_lowercase();
    if tag.starts_with("pt") {
      Some(Self::PtBr)
    } else if tag.starts_with("en") {
      Some(Self::En)
    } else {
      None
    }
  }
}

// ─── Codes and messages ──────────────────────────────────────────────────────

impl Error {
  /// Stable internal code; safe to match on from clients.
  pub fn code(&self) -> &'static str {
    match self {
      Self::InvalidBounds(_) => "invalid_bounds",
      Self::InvalidEffectiveFrom { .. } => "invalid_effective_from",
      Self::DuplicateSample(_) => "duplicate_sample",
      Self::DuplicateMeasurement { .. } => "duplicate_measurement",
      Self::UnknownProduct(_) => "unknown_product",
      Self::UnknownProperty(_) => "unknown_property",
      Self::UnknownLine(_) => "unknown_line",
      Self::UnknownShift(_) => "unknown_shift",
      Self::InvalidMeasurement { .. } => "invalid_measurement",
      Self::InvalidSample { .. } => "invalid_sample",
      Self::StaleSpecification { .. } => "stale_specification",
      Self::BackendUnavailable(_) => "backend_unavailable",
      Self::SampleNotFound(_) => "sample_not_found",
      Self::MeasurementNotFound(_) => "measurement_not_found",
    }
  }

  /// The request field the error refers to, when there is one.
  pub fn field(&self) -> Option<String> {
    match self {
      Self::UnknownProduct(_) => Some("product".into()),
      Self::UnknownLine(_) => Some("line".into()),
      Self::UnknownShift(_) => Some("shift".into()),
      Self::UnknownProperty(p) => Some(format!("measurements.{p}")),
      Self::InvalidMeasurement { property, .. }
      | Self::DuplicateMeasurement { property, .. } => {
        Some(format!("measurements.{property}"))
      }
      Self::InvalidSample { field, .. } => Some(field.clone()),
      Self::StaleSpecification { property, .. } => {
        Some(format!("measurements.{property}"))
      }
      _ => None,
    }
  }

  /// True for errors caused by the caller's input rather than the backend.
  pub fn is_validation(&self) -> bool {
    !matches!(
      self,
      Self::BackendUnavailable(_)
        | Self::SampleNotFound(_)
        | Self::MeasurementNotFound(_)
    )
  }

  /// The message shown to an operator in the given locale.
  pub fn localized(&self, locale: Locale) -> String {
    match locale {
      Locale::En => self.to_string(),
      Locale::PtBr => self.message_pt_br(),
    }
  }

  fn message_pt_br(&self) -> String {
    match self {
      Self::InvalidBounds(reason) => {
        format!("limites de especificação inválidos: {reason}")
      }
      Self::InvalidEffectiveFrom { product, property } => format!(
        "a especificação de {product}/{property} deve entrar em vigor após a \
         vigente"
      ),
      Self::DuplicateSample(key) => format!("amostra já cadastrada: {key}"),
      Self::DuplicateMeasurement { property, .. } => {
        format!("a propriedade {property} já foi medida nesta amostra")
      }
      Self::UnknownProduct(code) => format!("produto desconhecido: {code}"),
      Self::UnknownProperty(code) => {
        format!("propriedade desconhecida: {code}")
      }
      Self::UnknownLine(code) => {
        format!("linha de produção desconhecida: {code}")
      }
      Self::UnknownShift(code) => format!("turno desconhecido: {code}"),
      Self::InvalidMeasurement { property, value, reason } => {
        format!("valor {value:?} inválido para {property}: {reason}")
      }
      Self::InvalidSample { field, reason } => {
        format!("campo {field} inválido: {reason}")
      }
      Self::StaleSpecification { product, property } => format!(
        "não há especificação vigente para {product}/{property}"
      ),
      Self::BackendUnavailable(_) => {
        "banco de dados indisponível, tente novamente".to_string()
      }
      Self::SampleNotFound(id) => format!("amostra não encontrada: {id}"),
      Self::MeasurementNotFound(id) => {
        format!("medição não encontrada: {id}")
      }
    }
  }
}

/// Exposes the domain error inside a backend-specific error type, so layers
/// above the store can map it without knowing the backend.
pub trait DomainError {
  fn as_domain(&self) -> Option<&Error>;
}

impl DomainError for Error {
  fn as_domain(&self) -> Option<&Error> { Some(self) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn codes_are_stable_snake_case() {
    let err = Error::DuplicateSample("2024-03-14/A/L1".into());
    assert_eq!(err.code(), "duplicate_sample");
    assert!(err.is_validation());
    assert!(!Error::BackendUnavailable("locked".into()).is_validation());
  }

  #[test]
  fn portuguese_messages_differ_from_english() {
    let err = Error::UnknownShift("D".into());
    assert_eq!(err.localized(Locale::En), "unknown shift: D");
    assert_eq!(err.localized(Locale::PtBr), "turno desconhecido: D");
    assert_eq!(err.field().as_deref(), Some("shift"));
  }

  #[test]
  fn locale_from_accept_language() {
    assert_eq!(Locale::from_tag("pt-BR,pt;q=0.9"), Some(Locale::PtBr));
    assert_eq!(Locale::from_tag("en-US"), Some(Locale::En));
    assert_eq!(Locale::from_tag("fr"), None);
  }
}
