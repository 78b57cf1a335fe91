use std::fmt::Display;

use serde_json::Value;

use crate::types::Record;

/// Rectangular projection of a batch of schema-less rows.
///
/// Columns are the union of all keys seen across the rows, in first-seen
/// order; rows missing a key get an empty cell. Values are stringified as-is,
/// no other coercion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn from_records(records: &[Record]) -> Self {
        // Two passes: collect the column union first, then project.
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Renders the table as CSV, header line first.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_csv_row(&mut out, &self.columns);
        for row in &self.rows {
            write_csv_row(&mut out, row);
        }
        out
    }
}

impl Display for DataTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            writeln!(f, "{}", row.join(" | "))?;
        }
        Ok(())
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_csv_row(out: &mut String, row: &[String]) {
    let mut first = true;
    for cell in row {
        if !first {
            out.push(',');
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().expect("test row must be an object")
    }

    #[test]
    fn test_columns_are_key_union_in_first_seen_order() {
        let records = vec![
            record(json!({"Nombre": "Feria A", "Ciudad": "Bogotá"})),
            record(json!({"Nombre": "Feria B", "Aforo": 1200})),
        ];

        let table = DataTable::from_records(&records);

        assert_eq!(table.columns, vec!["Nombre", "Ciudad", "Aforo"]);
        assert_eq!(table.rows[0], vec!["Feria A", "Bogotá", ""]);
        assert_eq!(table.rows[1], vec!["Feria B", "", "1200"]);
    }

    #[test]
    fn test_scalars_stringified_null_empty() {
        let records = vec![record(json!({"a": 1.5, "b": true, "c": null, "d": "x"}))];

        let table = DataTable::from_records(&records);
        assert_eq!(table.rows[0], vec!["1.5", "true", "", "x"]);
    }

    #[test]
    fn test_empty_input() {
        let table = DataTable::from_records(&[]);
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert!(table.columns.is_empty());
    }

    #[test]
    fn test_to_csv_quotes_when_needed() {
        let records = vec![record(json!({
            "Nombre": "Feria, la \"grande\"",
            "Ciudad": "Bogotá",
        }))];

        let table = DataTable::from_records(&records);

        assert_eq!(
            table.to_csv(),
            "Nombre,Ciudad\n\"Feria, la \"\"grande\"\"\",Bogotá\n"
        );
    }
}
