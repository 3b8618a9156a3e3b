use csv::StringRecord;

/// Upload column names for the three required fields.
///
/// Defaults match the consumption export of the supplier portal:
/// `;`-separated, decimal comma, UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub timestamp: String,
    pub energy: String,
    pub price: String,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            timestamp: "Časovna Značka (CEST/CET)".to_string(),
            energy: "Poraba [kWh]".to_string(),
            price: "Dinamične Cene [EUR/kWh]".to_string(),
        }
    }
}

/// One data row, not yet normalized. `line` is the 1-based line in the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: u64,
    pub timestamp: String,
    pub energy: String,
    pub price: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("upload is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("malformed CSV: {0}")]
    Malformed(String),
    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("upload contains no data rows")]
    Empty,
    #[error("column '{column}' has no value on line {line}")]
    MissingValue { column: String, line: u64 },
}

pub const FIELD_DELIMITER: u8 = b';';

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parse and structurally validate an upload.
///
/// All-or-nothing: any structural problem rejects the whole upload. A field is
/// missing when the record is too short to contain it. A blank timestamp cell
/// also counts as missing; blank numeric cells are present values and are
/// dealt with by per-row coercion.
pub fn parse(raw: &[u8], schema: &ColumnSchema) -> Result<Vec<RawRow>, ValidationError> {
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    let text = std::str::from_utf8(raw).map_err(|e| ValidationError::Encoding(e.to_string()))?;

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| ValidationError::Malformed(format!("failed to read header: {e}")))?
        .clone();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let required = [&schema.timestamp, &schema.energy, &schema.price];
    let missing: Vec<String> = required
        .iter()
        .filter(|name| position(name.as_str()).is_none())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing));
    }

    // presence checked above
    let columns = required.map(|name| (name.as_str(), position(name.as_str()).unwrap_or_default()));

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(idx as u64 + 2);

        let [timestamp, energy, price] = columns.map(|(name, col)| field(&record, name, col, line));
        let timestamp = timestamp?;
        if timestamp.trim().is_empty() {
            return Err(ValidationError::MissingValue {
                column: schema.timestamp.clone(),
                line,
            });
        }

        rows.push(RawRow {
            line,
            timestamp,
            energy: energy?,
            price: price?,
        });
    }

    if rows.is_empty() {
        return Err(ValidationError::Empty);
    }

    tracing::debug!(rows = rows.len(), "upload parsed");
    Ok(rows)
}

fn field(record: &StringRecord, column: &str, idx: usize, line: u64) -> Result<String, ValidationError> {
    record
        .get(idx)
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingValue {
            column: column.to_string(),
            line,
        })
}
