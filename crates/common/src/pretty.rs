use crate::{RecordBatch, RecordId};
use tabled::{Table, builder::Builder, settings};
use types::Value;

/// Predefined output styles that map to `tabled` styles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TableStyleKind {
    #[default]
    Modern,
    Ascii,
    Plain,
}

impl TableStyleKind {
    fn apply(self, table: &mut Table) {
        match self {
            Self::Modern => table.with(settings::Style::modern()),
            Self::Ascii => table.with(settings::Style::ascii()),
            Self::Plain => table.with(settings::Style::empty()),
        };
    }
}

/// Render a `RecordBatch` into a human-friendly table string.
pub fn render_record_batch(batch: &RecordBatch, style: TableStyleKind) -> String {
    if batch.columns.is_empty() && batch.rows.is_empty() {
        return "<empty>".into();
    }

    let mut builder = Builder::default();
    if !batch.columns.is_empty() {
        builder.push_record(batch.columns.iter().cloned());
    }
    for row in &batch.rows {
        builder.push_record(row.values.iter().map(format_value));
    }

    let mut table = builder.build();
    style.apply(&mut table);
    table.to_string()
}

/// Format a full tuple into a parenthesized, comma-separated string.
pub fn format_tuple(values: &[Value]) -> String {
    let inner = values
        .iter()
        .map(format_value)
        .collect::<Vec<_>>()
        .join(", ");
    format!("({inner})")
}

/// Format a single value for display.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Text(text) => format!("'{}'", text),
    }
}

/// Format a `RecordId` as `(table:page, slot)`.
pub fn format_record_id(rid: &RecordId) -> String {
    format!("({}, {})", rid.page_id, rid.slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PageId, TableId, Tuple};

    #[test]
    fn record_batch_with_columns_renders_headers() {
        let batch = RecordBatch {
            columns: vec!["id".into(), "name".into()],
            rows: vec![Tuple::new(vec![Value::Int(1), Value::Text("Ada".into())])],
        };

        let rendered = render_record_batch(&batch, TableStyleKind::Modern);
        assert!(rendered.contains("id"));
        assert!(rendered.contains("'Ada'"));
    }

    #[test]
    fn empty_batches_render_placeholder() {
        let batch = RecordBatch {
            columns: vec![],
            rows: vec![],
        };

        assert_eq!(
            render_record_batch(&batch, TableStyleKind::Plain),
            "<empty>"
        );
    }

    #[test]
    fn tuples_and_record_ids_format_compactly() {
        assert_eq!(
            format_tuple(&[Value::Int(5), Value::Text("x".into())]),
            "(5, 'x')"
        );
        let rid = RecordId {
            page_id: PageId::new(TableId(3), 1),
            slot: 2,
        };
        assert_eq!(format_record_id(&rid), "(3:1, 2)");
    }
}
