//! Column-mapping guesser for spreadsheet imports.
//!
//! Exports from accounting tools and hand-made spreadsheets rarely use the
//! backend field names, so headers are matched against synonyms after
//! normalization (lowercase, no accents, punctuation collapsed to spaces).

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result, bail};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MovementField {
    Id,
    Fecha,
    CreatedAt,
    Monto,
    MontoCc,
    Debe,
    Haber,
    Descripcion,
    Cuenta,
    Proyecto,
    Moneda,
    Categoria,
    Referencia,
}

impl MovementField {
    pub const ALL: [MovementField; 13] = [
        MovementField::Id,
        MovementField::Fecha,
        MovementField::CreatedAt,
        MovementField::Monto,
        MovementField::MontoCc,
        MovementField::Debe,
        MovementField::Haber,
        MovementField::Descripcion,
        MovementField::Cuenta,
        MovementField::Proyecto,
        MovementField::Moneda,
        MovementField::Categoria,
        MovementField::Referencia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementField::Id => "id",
            MovementField::Fecha => "fecha",
            MovementField::CreatedAt => "createdAt",
            MovementField::Monto => "monto",
            MovementField::MontoCc => "montoCC",
            MovementField::Debe => "debe",
            MovementField::Haber => "haber",
            MovementField::Descripcion => "descripcion",
            MovementField::Cuenta => "cuenta",
            MovementField::Proyecto => "proyecto",
            MovementField::Moneda => "moneda",
            MovementField::Categoria => "categoria",
            MovementField::Referencia => "referencia",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = normalize_header(s).replace(' ', "");
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().to_lowercase() == wanted)
    }

    /// Synonyms in normalized form. More specific fields come first in
    /// [`MATCH_PRIORITY`] so `monto cc` is not taken by `monto`.
    fn synonyms(&self) -> &'static [&'static str] {
        match self {
            MovementField::Id => &["id", "codigo", "nro", "numero", "n", "identificador"],
            MovementField::Fecha => &[
                "fecha",
                "date",
                "fecha movimiento",
                "fecha de pago",
                "fecha pago",
                "fecha operacion",
                "dia",
            ],
            MovementField::CreatedAt => &[
                "created at",
                "createdat",
                "fecha creacion",
                "fecha de creacion",
                "fecha alta",
                "creado",
            ],
            MovementField::Monto => &["monto", "importe", "amount", "total", "valor", "monto total"],
            MovementField::MontoCc => &["monto cc", "montocc", "importe cc", "monto cuenta corriente"],
            MovementField::Debe => &["debe", "debito", "debit", "egreso", "salida", "cargo"],
            MovementField::Haber => &["haber", "credito", "credit", "ingreso", "entrada", "abono"],
            MovementField::Descripcion => &[
                "descripcion",
                "concepto",
                "detalle",
                "description",
                "observacion",
                "observaciones",
            ],
            MovementField::Cuenta => &["cuenta", "proveedor", "cliente", "account", "contraparte"],
            MovementField::Proyecto => &["proyecto", "obra", "project"],
            MovementField::Moneda => &["moneda", "currency", "divisa"],
            MovementField::Categoria => &["categoria", "rubro", "category", "tipo"],
            MovementField::Referencia => &[
                "referencia",
                "comprobante",
                "reference",
                "nro comprobante",
                "factura",
            ],
        }
    }
}

impl fmt::Display for MovementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const MATCH_PRIORITY: [MovementField; 13] = [
    MovementField::MontoCc,
    MovementField::CreatedAt,
    MovementField::Referencia,
    MovementField::Fecha,
    MovementField::Debe,
    MovementField::Haber,
    MovementField::Monto,
    MovementField::Descripcion,
    MovementField::Cuenta,
    MovementField::Proyecto,
    MovementField::Moneda,
    MovementField::Categoria,
    MovementField::Id,
];

/// Which CSV column feeds which movement field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMapping {
    pub columns: BTreeMap<MovementField, usize>,
    pub headers: Vec<String>,
    /// Headers that matched no field
    pub unmapped: Vec<String>,
}

impl ColumnMapping {
    pub fn get(&self, field: MovementField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// A mapping is usable when it can produce an amount.
    pub fn has_amount(&self) -> bool {
        [
            MovementField::Monto,
            MovementField::MontoCc,
            MovementField::Debe,
            MovementField::Haber,
        ]
        .iter()
        .any(|field| self.columns.contains_key(field))
    }

    /// Apply an override of the form `field=header` (or `field=<column index>`).
    pub fn apply_override(&mut self, spec: &str) -> Result<()> {
        let (field_name, column) = spec
            .split_once('=')
            .with_context(|| format!("Invalid mapping '{}': expected field=header", spec))?;

        let field = MovementField::from_str(field_name)
            .with_context(|| format!("Unknown movement field '{}'", field_name.trim()))?;

        let column = column.trim();
        let wanted = normalize_header(column);
        let index = match self
            .headers
            .iter()
            .position(|h| normalize_header(h) == wanted)
        {
            Some(index) => index,
            None => match column.parse::<usize>() {
                Ok(index) if index < self.headers.len() => index,
                _ => bail!("Column '{}' not found in header", column),
            },
        };

        self.columns.retain(|_, mapped| *mapped != index);
        self.columns.insert(field, index);
        let header = &self.headers[index];
        self.unmapped.retain(|h| h != header);
        Ok(())
    }
}

/// Guess which header feeds which field.
///
/// Exact synonym matches are assigned first; remaining headers are then
/// matched when a synonym appears as a whole-word sequence inside them.
/// Each field takes at most one column and each column at most one field,
/// leftmost column first.
pub fn guess_column_mapping<S: AsRef<str>>(headers: &[S]) -> ColumnMapping {
    let headers: Vec<String> = headers.iter().map(|h| h.as_ref().to_string()).collect();
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut columns: BTreeMap<MovementField, usize> = BTreeMap::new();
    let mut taken = vec![false; headers.len()];

    // Exact matches
    for (index, header) in normalized.iter().enumerate() {
        if header.is_empty() {
            continue;
        }
        let field = MATCH_PRIORITY.into_iter().find(|field| {
            !columns.contains_key(field) && field.synonyms().contains(&header.as_str())
        });
        if let Some(field) = field {
            columns.insert(field, index);
            taken[index] = true;
        }
    }

    // Whole-word containment
    for (index, header) in normalized.iter().enumerate() {
        if taken[index] || header.is_empty() {
            continue;
        }
        let words: Vec<&str> = header.split(' ').collect();
        let field = MATCH_PRIORITY.into_iter().find(|field| {
            !columns.contains_key(field)
                && field
                    .synonyms()
                    .iter()
                    .filter(|synonym| synonym.len() > 1)
                    .any(|synonym| contains_words(&words, synonym))
        });
        if let Some(field) = field {
            columns.insert(field, index);
            taken[index] = true;
        }
    }

    let unmapped = headers
        .iter()
        .zip(&taken)
        .filter(|(_, taken)| !**taken)
        .map(|(header, _)| header.clone())
        .collect();

    ColumnMapping {
        columns,
        headers,
        unmapped,
    }
}

fn contains_words(words: &[&str], synonym: &str) -> bool {
    let needle: Vec<&str> = synonym.split(' ').collect();
    words.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Lowercase, strip accents, turn punctuation into single spaces.
pub fn normalize_header(header: &str) -> String {
    let folded: String = header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
