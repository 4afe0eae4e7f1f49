//! Minimal CSV reading and writing
//!
//! Quote-aware on both sides: fields containing the separator, double
//! quotes or line breaks are wrapped in double quotes with internal
//! quotes doubled; the parser tolerates CRLF and quoted separators.
//!
//! Export headers are the union of keys across all rows, so a column
//! present in only some rows is never silently lost.

use sicop_common::Row;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write as _;

/* ---------------- Parsing ---------------- */

/// Parse CSV text into raw string cells (quotes + CRLF tolerant).
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next(); // double-quote escape
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                row.push(std::mem::take(&mut field));
            }
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                if !row.is_empty() && !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Flush any trailing field/row even if quotes were unterminated.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Parse CSV text into dynamic rows: the first record is the header,
/// every following record maps header name -> string value. Short
/// records leave trailing columns absent; extra cells are ignored.
pub fn rows_from_csv(text: &str) -> Vec<Row> {
    let mut records = parse_rows(text);
    if records.is_empty() {
        return Vec::new();
    }
    let header = records.remove(0);

    records
        .into_iter()
        .map(|cells| {
            header
                .iter()
                .zip(cells)
                .map(|(name, cell)| (name.clone(), Value::String(cell)))
                .collect()
        })
        .collect()
}

/* ---------------- Writing ---------------- */

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Append one escaped CSV record terminated by `\n`.
pub fn write_record(out: &mut String, cells: &[String]) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            let escaped = cell.replace('"', "\"\"");
            let _ = write!(out, "\"{escaped}\"");
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

/// Serialize dynamic rows to CSV text. The header is the union of keys
/// actually found across all rows, in first-seen order; absent values
/// render as empty fields, null as empty.
pub fn rows_to_csv(rows: &[Row]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for row in rows {
        for key in row.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
    }

    let mut out = String::new();
    write_record(&mut out, &columns);

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| row.get(column).map(csv_cell).unwrap_or_default())
            .collect();
        write_record(&mut out, &cells);
    }

    out
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn quotes_and_commas_are_escaped() {
        let rows = vec![row(&[("note", json!("He said \"hi\", ok"))])];
        let csv = rows_to_csv(&rows);
        assert_eq!(csv, "note\n\"He said \"\"hi\"\", ok\"\n");
    }

    #[test]
    fn header_is_union_of_all_keys() {
        let rows = vec![
            row(&[("a", json!(1))]),
            row(&[("a", json!(2)), ("b", json!("x"))]),
        ];
        let csv = rows_to_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("a,b"));
        assert_eq!(lines.next(), Some("1,"));
        assert_eq!(lines.next(), Some("2,x"));
    }

    #[test]
    fn null_renders_empty() {
        let rows = vec![row(&[("a", Value::Null), ("b", json!(false))])];
        assert_eq!(rows_to_csv(&rows), "a,b\n,false\n");
    }

    #[test]
    fn parse_round_trips_escaping() {
        let parsed = parse_rows("note\n\"He said \"\"hi\"\", ok\"\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1][0], "He said \"hi\", ok");
    }

    #[test]
    fn parse_tolerates_crlf_and_quoted_newlines() {
        let parsed = parse_rows("a,b\r\n\"line\nbreak\",2\r\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1][0], "line\nbreak");
        assert_eq!(parsed[1][1], "2");
    }

    #[test]
    fn rows_from_csv_maps_header_to_values() {
        let rows = rows_from_csv("name,amount\nAcme,100\nBeta,200\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&json!("Acme")));
        assert_eq!(rows[1].get("amount"), Some(&json!("200")));
    }

    #[test]
    fn rows_from_csv_handles_short_records() {
        let rows = rows_from_csv("a,b\n1\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&json!("1")));
        assert!(rows[0].get("b").is_none());
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(rows_from_csv("").is_empty());
        assert_eq!(rows_to_csv(&[]), "");
    }
}
