use schemars::JsonSchema;
use serde::de::{IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder for a cell where no reliable value was located.
pub const SENTINEL: &str = "MISSING";

/// Placeholder for a currency or unit that no chunk reported.
pub const UNKNOWN: &str = "UNKNOWN";

pub type TextSegment = String;

/// A bounded slice of the joined document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the chunk sequence
    pub index: usize,
    /// Byte offset of `text` within the joined document text
    pub offset: usize,
    pub text: String,
    /// Too little signal to be worth a parse
    pub skip: bool,
}

/// The structured, possibly incomplete view of one chunk, as returned by the
/// inference service. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartialRecord {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    #[schemars(description = "Reporting currency as written in the document (e.g. 'INR', 'USD'). Empty if not stated.")]
    pub currency: Option<String>,

    #[serde(default, deserialize_with = "lenient_opt_string")]
    #[schemars(description = "Reporting unit as written in the document (e.g. 'crore', 'lakhs', 'millions'). Empty if not stated.")]
    pub unit: Option<String>,

    #[serde(default, deserialize_with = "lenient_string_vec")]
    #[schemars(description = "Column period labels exactly as written (e.g. '2024', 'FY 2023-24', 'Q2 2023'). Always strings.")]
    pub years: Vec<String>,

    #[serde(default, deserialize_with = "lenient_rows")]
    #[schemars(description = "Income statement line items only.")]
    pub rows: Vec<RawRow>,
}

impl PartialRecord {
    /// The record a chunk degrades to when nothing could be parsed from it.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty() && self.rows.is_empty()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PartialRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawRow {
    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(description = "Line item label exactly as it appears in the statement")]
    pub name: String,

    /// Period label to raw value, in the order the service emitted them.
    #[serde(
        default,
        deserialize_with = "ordered_values",
        serialize_with = "serialize_values"
    )]
    #[schemars(
        with = "BTreeMap<String, String>",
        description = "Map of period label (as listed in `years`) to the value string exactly as printed, or 'MISSING'"
    )]
    pub values: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(name: impl Into<String>, values: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// A fiscal year. Every accepted raw period label reduces to one of these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CanonicalPeriod(i32);

impl CanonicalPeriod {
    pub fn new(year: i32) -> Self {
        Self(year)
    }

    pub fn year(self) -> i32 {
        self.0
    }
}

impl fmt::Display for CanonicalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line item after alias resolution. Holds at most one value per period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRow {
    pub key: String,
    /// Row name as first printed in the document
    pub label: String,
    pub values: BTreeMap<CanonicalPeriod, String>,
}

impl CanonicalRow {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            values: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// One partial record after its labels have been mapped onto the taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalRecord {
    pub currency: Option<String>,
    pub unit: Option<String>,
    /// Distinct, in first-seen order
    pub periods: Vec<CanonicalPeriod>,
    /// Distinct keys, in first-seen order
    pub rows: Vec<CanonicalRow>,
}

/// The reconciled income statement.
///
/// Every row holds exactly one value per period, and every value is either a
/// plain decimal string or [`SENTINEL`]. The only way to build one is through
/// the validator, so the invariants hold for every instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    currency: String,
    unit: String,
    periods: Vec<CanonicalPeriod>,
    rows: Vec<DatasetRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRow {
    key: String,
    label: String,
    /// Positionally aligned with the owning dataset's periods
    cells: Vec<String>,
}

impl Dataset {
    pub(crate) fn from_parts(
        currency: String,
        unit: String,
        periods: Vec<CanonicalPeriod>,
        rows: Vec<DatasetRow>,
    ) -> Self {
        debug_assert!(rows.iter().all(|r| r.cells.len() == periods.len()));
        Self {
            currency,
            unit,
            periods,
            rows,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn periods(&self) -> &[CanonicalPeriod] {
        &self.periods
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    /// Looks a row up by its canonical key.
    pub fn row(&self, key: &str) -> Option<&DatasetRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    /// Value of `row` in `period`, if both are part of this dataset.
    pub fn value(&self, row: &str, period: CanonicalPeriod) -> Option<&str> {
        let col = self.periods.iter().position(|p| *p == period)?;
        self.row(row).map(|r| r.cells[col].as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DatasetRow {
    pub(crate) fn new(key: String, label: String, cells: Vec<String>) -> Self {
        Self { key, label, cells }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Display name, as first printed in the document.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

/// JSON numbers are written out in plain positional notation, never with an
/// exponent.
fn number_to_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map(|f| f.to_string()).unwrap_or_default()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_to_string(n)),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn lenient_string_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let labels = match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(&other).into_iter().collect::<Vec<_>>(),
    };
    Ok(labels
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Rows that do not have the expected shape are dropped one by one instead of
/// failing the whole record.
fn lenient_rows<'de, D>(deserializer: D) -> std::result::Result<Vec<RawRow>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| RawRow::deserialize(item).ok())
        .collect())
}

struct OrderedValues;

impl<'de> Visitor<'de> for OrderedValues {
    type Value = Vec<(String, String)>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping period labels to values")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut values = Vec::new();
        while let Some((label, value)) = map.next_entry::<String, Value>()? {
            let value = scalar_to_string(&value).unwrap_or_else(|| SENTINEL.to_string());
            values.push((label, value));
        }
        Ok(values)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Vec::new())
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_str<E>(self, _: &str) -> std::result::Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_bool<E>(self, _: bool) -> std::result::Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_i64<E>(self, _: i64) -> std::result::Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_u64<E>(self, _: u64) -> std::result::Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_f64<E>(self, _: f64) -> std::result::Result<Self::Value, E> {
        Ok(Vec::new())
    }
}

fn ordered_values<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(OrderedValues)
}

fn serialize_values<S>(values: &[(String, String)], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(values.iter().map(|(k, v)| (k, v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = PartialRecord::schema_as_json().unwrap();
        assert!(schema_json.contains("currency"));
        assert!(schema_json.contains("years"));
        assert!(schema_json.contains("rows"));
    }

    #[test]
    fn test_missing_fields_default() {
        let record: PartialRecord = serde_json::from_str(r#"{"rows": []}"#).unwrap();
        assert_eq!(record.currency, None);
        assert_eq!(record.unit, None);
        assert!(record.is_empty());
    }

    #[test]
    fn test_lenient_scalars() {
        let json = r#"{
            "currency": "INR",
            "unit": null,
            "years": [2023, "2024", null, ""],
            "rows": [
                {"name": "Revenue", "values": {"2024": 1200, "2023": "1,100", "2022": null}},
                "not a row",
                {"name": "Tax", "values": []}
            ]
        }"#;
        let record: PartialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.currency.as_deref(), Some("INR"));
        assert_eq!(record.unit, None);
        assert_eq!(record.years, vec!["2023", "2024"]);
        assert_eq!(record.rows.len(), 2);
        assert_eq!(
            record.rows[0].values,
            vec![
                ("2024".to_string(), "1200".to_string()),
                ("2023".to_string(), "1,100".to_string()),
                ("2022".to_string(), SENTINEL.to_string()),
            ]
        );
        assert!(record.rows[1].values.is_empty());
    }

    #[test]
    fn test_values_keep_source_order() {
        let json = r#"{"name": "Revenue", "values": {"FY24": "1", "2023": "2", "Q1": "3"}}"#;
        let row: RawRow = serde_json::from_str(json).unwrap();
        let labels: Vec<&str> = row.values.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(labels, vec!["FY24", "2023", "Q1"]);
    }

    #[test]
    fn test_row_values_keep_source_order_inside_record() {
        let json = r#"{"years": ["FY24"], "rows": [
            {"name": "Revenue", "values": {"FY24": "10", "2024": "20", "2023": "5"}}
        ]}"#;
        let record: PartialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(
            record.rows[0].values,
            vec![
                ("FY24".to_string(), "10".to_string()),
                ("2024".to_string(), "20".to_string()),
                ("2023".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers_never_use_exponents() {
        let json = r#"{"name": "Revenue", "values": {"2024": 1e20, "2023": 1.5, "2022": -42}}"#;
        let row: RawRow = serde_json::from_str(json).unwrap();
        let values: Vec<&str> = row.values.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["100000000000000000000", "1.5", "-42"]);
    }

    #[test]
    fn test_dataset_value_lookup() {
        let periods = vec![CanonicalPeriod::new(2023), CanonicalPeriod::new(2024)];
        let dataset = Dataset::from_parts(
            "INR".to_string(),
            "crore".to_string(),
            periods,
            vec![DatasetRow::new(
                "revenue".to_string(),
                "Revenue from operations".to_string(),
                vec!["100".to_string(), SENTINEL.to_string()],
            )],
        );
        assert_eq!(dataset.value("revenue", CanonicalPeriod::new(2023)), Some("100"));
        assert_eq!(dataset.value("revenue", CanonicalPeriod::new(2024)), Some(SENTINEL));
        assert_eq!(dataset.value("revenue", CanonicalPeriod::new(2025)), None);
        assert_eq!(dataset.value("tax expense", CanonicalPeriod::new(2023)), None);
    }
}
