use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::json::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::error::Result;

/// A flat, serializable row with a fixed arrow schema.
pub trait TableRow: Serialize {
    fn schema() -> Schema;
}

pub fn record_batch<R: TableRow>(rows: &[R]) -> Result<RecordBatch> {
    let schema = Arc::new(R::schema());
    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(rows.len().max(1))
        .build_decoder()?;
    decoder.serialize(rows)?;

    Ok(decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(schema)))
}

#[cfg(test)]
mod tests {
    use arrow::array::Array;
    use arrow::array::Float64Array;
    use arrow::array::StringArray;
    use arrow::datatypes::DataType;
    use arrow::datatypes::Field;
    use arrow::datatypes::Schema;
    use serde::Serialize;

    use crate::data_table::record_batch;
    use crate::data_table::TableRow;

    #[derive(Serialize)]
    struct Row {
        segment: String,
        value: Option<f64>,
    }

    impl TableRow for Row {
        fn schema() -> Schema {
            Schema::new(vec![
                Field::new("segment", DataType::Utf8, false),
                Field::new("value", DataType::Float64, true),
            ])
        }
    }

    #[test]
    fn test_record_batch() {
        let rows = vec![
            Row {
                segment: "a".to_string(),
                value: Some(1.5),
            },
            Row {
                segment: "b".to_string(),
                value: None,
            },
        ];

        let batch = record_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let segments = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(segments.value(1), "b");
        let values = batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(values.value(0), 1.5);
        assert!(values.is_null(1));
    }

    #[test]
    fn test_empty() {
        let batch = record_batch::<Row>(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
    }
}
