use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Amount, ChronoKey, RawDate, id_embedded_millis, millis_or_epoch, round_amount};

pub type MovementId = String;

/// Audit metadata the backend attaches to a movement.
/// Only `createdAt` is interpreted; everything else is carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalData {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::date"
    )]
    pub created_at: Option<RawDate>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// A single ledger entry against a cash account, in backend shape.
///
/// Every field is optional on the wire. Malformed values deserialize to
/// `None` instead of failing, so a whole snapshot never fails to load
/// because of one bad record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: MovementId,
    /// Signed amount: negative is a debit, positive a credit
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::amount"
    )]
    pub monto: Option<Amount>,
    /// Amount in the account's own currency; takes precedence over `monto`
    #[serde(
        rename = "montoCC",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::amount"
    )]
    pub monto_cc: Option<Amount>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::amount"
    )]
    pub debe: Option<Amount>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::amount"
    )]
    pub haber: Option<Amount>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::date"
    )]
    pub fecha: Option<RawDate>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::original_data"
    )]
    pub original_data: Option<OriginalData>,
    /// Account or counterparty (supplier, client, cash box)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub cuenta: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub proyecto: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub moneda: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub descripcion: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub categoria: Option<String>,
}

impl Movement {
    pub fn new(id: impl Into<MovementId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_monto(mut self, monto: Amount) -> Self {
        self.monto = Some(monto);
        self
    }

    pub fn with_monto_cc(mut self, monto_cc: Amount) -> Self {
        self.monto_cc = Some(monto_cc);
        self
    }

    pub fn with_debe(mut self, debe: Amount) -> Self {
        self.debe = Some(debe);
        self
    }

    pub fn with_haber(mut self, haber: Amount) -> Self {
        self.haber = Some(haber);
        self
    }

    pub fn with_fecha(mut self, fecha: impl Into<RawDate>) -> Self {
        self.fecha = Some(fecha.into());
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<RawDate>) -> Self {
        self.original_data
            .get_or_insert_with(OriginalData::default)
            .created_at = Some(created_at.into());
        self
    }

    pub fn with_cuenta(mut self, cuenta: impl Into<String>) -> Self {
        self.cuenta = Some(cuenta.into());
        self
    }

    pub fn with_proyecto(mut self, proyecto: impl Into<String>) -> Self {
        self.proyecto = Some(proyecto.into());
        self
    }

    pub fn with_moneda(mut self, moneda: impl Into<String>) -> Self {
        self.moneda = Some(moneda.into());
        self
    }

    pub fn with_descripcion(mut self, descripcion: impl Into<String>) -> Self {
        self.descripcion = Some(descripcion.into());
        self
    }

    pub fn with_categoria(mut self, categoria: impl Into<String>) -> Self {
        self.categoria = Some(categoria.into());
        self
    }

    /// The amount that drives the balance: `montoCC` if present, else `monto`, else 0.
    pub fn resolved_monto(&self) -> Amount {
        self.monto_cc
            .or(self.monto)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// Returns `(debe, haber)`.
    ///
    /// Explicit fields win; a missing side counts as 0. Without either
    /// field the split follows the sign of the resolved monto.
    pub fn debe_haber(&self) -> (Amount, Amount) {
        if self.debe.is_some() || self.haber.is_some() {
            return (
                round_amount(self.debe.unwrap_or(0.0)),
                round_amount(self.haber.unwrap_or(0.0)),
            );
        }

        let monto = round_amount(self.resolved_monto());
        if monto < 0.0 {
            (-monto, 0.0)
        } else {
            (0.0, monto)
        }
    }

    /// Effect of this movement on the balance (`haber - debe`).
    pub fn signed_amount(&self) -> Amount {
        let (debe, haber) = self.debe_haber();
        round_amount(haber - debe)
    }

    /// Whether the record carries any amount at all.
    pub fn has_amount(&self) -> bool {
        self.monto.is_some() || self.monto_cc.is_some() || self.debe.is_some() || self.haber.is_some()
    }

    pub fn fecha_utc(&self) -> Option<DateTime<Utc>> {
        self.fecha.as_ref().and_then(RawDate::to_utc)
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.original_data
            .as_ref()
            .and_then(|data| data.created_at.as_ref())
            .and_then(RawDate::to_utc)
    }

    /// Ordering key: movement date, then creation time (explicit or
    /// embedded in the id), then the id itself.
    pub fn chrono_key(&self) -> ChronoKey {
        let created = self
            .created_at_utc()
            .map(|d| d.timestamp_millis())
            .or_else(|| id_embedded_millis(&self.id))
            .unwrap_or(0);

        ChronoKey {
            fecha: millis_or_epoch(self.fecha_utc()),
            created,
            id: self.id.clone(),
        }
    }
}

/// Chronological comparator for movements.
pub fn chronological_cmp(a: &Movement, b: &Movement) -> std::cmp::Ordering {
    a.chrono_key().cmp(&b.chrono_key())
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::OriginalData;
    use crate::domain::{Amount, RawDate, coerce_amount};

    pub fn amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Amount>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(coerce_amount(&value))
    }

    pub fn date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RawDate>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(RawDate::from_value(&value))
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
    }

    pub fn original_data<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OriginalData>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        })
    }
}
