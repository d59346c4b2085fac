//! Transformer: derives the transformed listings table from the raw one.
//!
//! The raw batch is never modified; every output column is either shared
//! with the raw batch or freshly built, one value per raw row, in raw row
//! order.

use arrow::array::{
    Array, ArrayRef, AsArray, Date32Array, Float64Array, Int64Array, Time64MicrosecondArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Field, Float64Type, Schema, TimeUnit, TimestampMicrosecondType,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use common::{Error, Result};
use datafusion::prelude::SessionContext;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::models::{
    AVG_PRICE, LAST_REVIEW, LAST_REVIEW_DATE, LAST_REVIEW_TIME, MISSING_REVIEWS_PER_MONTH,
    NEIGHBOURHOOD, PRICE, REVIEWS_PER_MONTH,
};

const MICROS_PER_DAY: i64 = 86_400_000_000;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

pub struct DataTransformer {
    ctx: SessionContext,
}

impl Default for DataTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTransformer {
    pub fn new() -> Self {
        Self::with_context(SessionContext::new())
    }

    pub fn with_context(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    pub async fn transform(&self, raw: &RecordBatch) -> Result<RecordBatch> {
        let transformed = self
            .transform_batch(raw)
            .await
            .inspect_err(|e| error!("{}", e))?;

        info!(
            rows = transformed.num_rows(),
            columns = transformed.num_columns(),
            "Data transformation completed successfully"
        );
        Ok(transformed)
    }

    async fn transform_batch(&self, raw: &RecordBatch) -> Result<RecordBatch> {
        let last_review = required_column(raw, LAST_REVIEW)?;
        let reviews_per_month = required_column(raw, REVIEWS_PER_MONTH)?;

        // Review timestamps, coerced; unparsable values become null
        let review_micros = coerce_timestamps(last_review)?;
        let last_review = TimestampMicrosecondArray::from(review_micros.clone());
        let review_dates = Date32Array::from(
            review_micros
                .iter()
                .map(|micros| micros.map(|m| m.div_euclid(MICROS_PER_DAY) as i32))
                .collect::<Vec<_>>(),
        );
        let review_times = Time64MicrosecondArray::from(
            review_micros
                .iter()
                .map(|micros| micros.map(|m| m.rem_euclid(MICROS_PER_DAY)))
                .collect::<Vec<_>>(),
        );

        let avg_price = self.average_price_by_neighbourhood(raw).await?;

        // The flag must see the nulls before they are zeroed
        let reviews = cast(reviews_per_month, &DataType::Float64)?;
        let reviews = reviews.as_primitive::<Float64Type>();
        let missing_reviews =
            Int64Array::from_iter_values(reviews.iter().map(|v| i64::from(v.is_none())));
        let imputed_reviews = Float64Array::from_iter_values(reviews.iter().map(|v| v.unwrap_or(0.0)));

        let raw_schema = raw.schema();
        let mut fields: Vec<Field> = Vec::with_capacity(raw.num_columns() + 4);
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(raw.num_columns() + 4);

        for (field, column) in raw_schema.fields().iter().zip(raw.columns()) {
            match field.name().as_str() {
                LAST_REVIEW => {
                    fields.push(Field::new(LAST_REVIEW, last_review.data_type().clone(), true));
                    columns.push(Arc::new(last_review.clone()));
                }
                REVIEWS_PER_MONTH => {
                    fields.push(Field::new(REVIEWS_PER_MONTH, DataType::Float64, false));
                    columns.push(Arc::new(imputed_reviews.clone()));
                }
                _ => {
                    fields.push(field.as_ref().clone());
                    columns.push(column.clone());
                }
            }
        }

        fields.push(Field::new(LAST_REVIEW_DATE, DataType::Date32, true));
        columns.push(Arc::new(review_dates));
        fields.push(Field::new(
            LAST_REVIEW_TIME,
            DataType::Time64(TimeUnit::Microsecond),
            true,
        ));
        columns.push(Arc::new(review_times));
        fields.push(Field::new(AVG_PRICE, DataType::Float64, true));
        columns.push(Arc::new(avg_price));
        fields.push(Field::new(MISSING_REVIEWS_PER_MONTH, DataType::Int64, false));
        columns.push(Arc::new(missing_reviews));

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }

    /// Mean of non-null `price` per `neighbourhood`, broadcast to every row.
    /// Rows with a null neighbourhood form one group of their own.
    async fn average_price_by_neighbourhood(&self, raw: &RecordBatch) -> Result<Float64Array> {
        let schema = raw.schema();
        let key_idx = column_index(raw, NEIGHBOURHOOD)?;
        let price_idx = column_index(raw, PRICE)?;

        let price_type = schema.field(price_idx).data_type();
        if !price_type.is_numeric() {
            return Err(Error::TransformFailed(format!(
                "column `{}` is {} and cannot be averaged",
                PRICE, price_type
            )));
        }

        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let temp_table = format!("temp_listings_{}", timestamp);

        self.ctx
            .register_batch(&temp_table, raw.project(&[key_idx, price_idx])?)?;

        let query = format!(
            "SELECT \"{key}\" AS neighbourhood, AVG(\"{price}\") AS avg_price \
             FROM {table} GROUP BY \"{key}\"",
            key = NEIGHBOURHOOD,
            price = PRICE,
            table = temp_table,
        );
        let grouped = match self.ctx.sql(&query).await {
            Ok(df) => df.collect().await,
            Err(e) => Err(e),
        };

        self.ctx.deregister_table(temp_table.as_str())?;

        let averages = GroupAverages::from_batches(&grouped?)?;
        debug!(groups = averages.len(), "Computed average price per neighbourhood");

        let keys = cast(raw.column(key_idx), &DataType::Utf8)?;
        let keys = keys.as_string::<i32>();

        Ok(Float64Array::from(
            keys.iter()
                .map(|key| averages.get(key))
                .collect::<Vec<Option<f64>>>(),
        ))
    }
}

/// Per-neighbourhood averages, keyed by the neighbourhood rendered as text.
#[derive(Debug, Default)]
struct GroupAverages {
    by_key: HashMap<String, Option<f64>>,
    /// Outer `None` when no row lacked a neighbourhood.
    missing_key: Option<Option<f64>>,
}

impl GroupAverages {
    fn from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let mut averages = Self::default();

        for batch in batches {
            let keys = cast(batch.column(0), &DataType::Utf8)?;
            let keys = keys.as_string::<i32>();
            let values = cast(batch.column(1), &DataType::Float64)?;
            let values = values.as_primitive::<Float64Type>();

            for idx in 0..batch.num_rows() {
                let avg = values.is_valid(idx).then(|| values.value(idx));
                if keys.is_valid(idx) {
                    averages.by_key.insert(keys.value(idx).to_string(), avg);
                } else {
                    averages.missing_key = Some(avg);
                }
            }
        }

        Ok(averages)
    }

    fn get(&self, key: Option<&str>) -> Option<f64> {
        match key {
            Some(key) => self.by_key.get(key).copied().flatten(),
            None => self.missing_key.flatten(),
        }
    }

    fn len(&self) -> usize {
        self.by_key.len() + usize::from(self.missing_key.is_some())
    }
}

fn column_index(raw: &RecordBatch, name: &str) -> Result<usize> {
    raw.schema()
        .index_of(name)
        .map_err(|_| Error::TransformFailed(format!("missing column `{}`", name)))
}

fn required_column<'a>(raw: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    column_index(raw, name).map(|idx| raw.column(idx))
}

/// Microseconds since the epoch for each value, null where the value is
/// null or cannot be read as a date or date-time.
fn coerce_timestamps(array: &ArrayRef) -> Result<Vec<Option<i64>>> {
    Ok(match array.data_type() {
        DataType::Date32 => array
            .as_primitive::<Date32Type>()
            .iter()
            .map(|days| days.map(|d| i64::from(d) * MICROS_PER_DAY))
            .collect(),
        DataType::Date64 | DataType::Timestamp(_, _) => {
            let micros = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))?;
            micros
                .as_primitive::<TimestampMicrosecondType>()
                .iter()
                .collect()
        }
        _ => {
            let text = cast(array, &DataType::Utf8)?;
            text.as_string::<i32>()
                .iter()
                .map(|value| value.and_then(parse_timestamp))
                .collect()
        }
    })
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_micros());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, Int64Array, StringArray};
    use arrow::datatypes::Time64MicrosecondType;

    fn listings(
        neighbourhoods: Vec<Option<&str>>,
        prices: Vec<Option<i64>>,
        last_reviews: Vec<Option<&str>>,
        reviews_per_month: Vec<Option<f64>>,
    ) -> RecordBatch {
        let ids: Vec<i64> = (1..=neighbourhoods.len() as i64).collect();
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("id", DataType::Int64, false),
                Field::new(NEIGHBOURHOOD, DataType::Utf8, true),
                Field::new(PRICE, DataType::Int64, true),
                Field::new(LAST_REVIEW, DataType::Utf8, true),
                Field::new(REVIEWS_PER_MONTH, DataType::Float64, true),
            ])),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(neighbourhoods)),
                Arc::new(Int64Array::from(prices)),
                Arc::new(StringArray::from(last_reviews)),
                Arc::new(Float64Array::from(reviews_per_month)),
            ],
        )
        .unwrap()
    }

    fn f64_column(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_primitive::<Float64Type>()
            .iter()
            .collect()
    }

    fn i64_column(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_primitive::<arrow::datatypes::Int64Type>()
            .iter()
            .collect()
    }

    #[tokio::test]
    async fn test_average_and_imputation() {
        let raw = listings(
            vec![Some("A"), Some("A")],
            vec![Some(100), Some(200)],
            vec![None, Some("2019-05-21")],
            vec![None, Some(5.0)],
        );
        let out = DataTransformer::new().transform(&raw).await.unwrap();

        assert_eq!(out.num_rows(), 2);
        assert_eq!(f64_column(&out, AVG_PRICE), vec![Some(150.0), Some(150.0)]);
        assert_eq!(f64_column(&out, REVIEWS_PER_MONTH), vec![Some(0.0), Some(5.0)]);
        assert_eq!(i64_column(&out, MISSING_REVIEWS_PER_MONTH), vec![Some(1), Some(0)]);
    }

    #[tokio::test]
    async fn test_derived_columns_follow_raw_columns() {
        let raw = listings(vec![Some("A")], vec![Some(1)], vec![None], vec![None]);
        let out = DataTransformer::new().transform(&raw).await.unwrap();
        let schema = out.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();

        assert_eq!(
            names,
            vec![
                "id",
                NEIGHBOURHOOD,
                PRICE,
                LAST_REVIEW,
                REVIEWS_PER_MONTH,
                LAST_REVIEW_DATE,
                LAST_REVIEW_TIME,
                AVG_PRICE,
                MISSING_REVIEWS_PER_MONTH,
            ]
        );
    }

    #[tokio::test]
    async fn test_last_review_split_and_coercion() {
        let raw = listings(
            vec![Some("A"), Some("A"), Some("A")],
            vec![Some(1), Some(2), Some(3)],
            vec![Some("2019-05-21 13:45:10"), Some("not a date"), None],
            vec![Some(1.0), Some(1.0), Some(1.0)],
        );
        let out = DataTransformer::new().transform(&raw).await.unwrap();

        let dates = out
            .column_by_name(LAST_REVIEW_DATE)
            .unwrap()
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(
            dates.value_as_date(0),
            NaiveDate::from_ymd_opt(2019, 5, 21)
        );
        assert!(dates.is_null(1));
        assert!(dates.is_null(2));

        let times = out
            .column_by_name(LAST_REVIEW_TIME)
            .unwrap()
            .as_primitive::<Time64MicrosecondType>();
        assert_eq!(times.value(0), ((13 * 60 + 45) * 60 + 10) * 1_000_000);
        assert!(times.is_null(1));

        let reviews = out.column_by_name(LAST_REVIEW).unwrap();
        assert!(reviews.is_valid(0));
        assert!(reviews.is_null(1));
    }

    #[tokio::test]
    async fn test_date_typed_last_review() {
        let raw = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new(NEIGHBOURHOOD, DataType::Utf8, true),
                Field::new(PRICE, DataType::Int64, true),
                Field::new(LAST_REVIEW, DataType::Date32, true),
                Field::new(REVIEWS_PER_MONTH, DataType::Float64, true),
            ])),
            vec![
                Arc::new(StringArray::from(vec!["A"])),
                Arc::new(Int64Array::from(vec![10])),
                Arc::new(Date32Array::from(vec![Some(18_037)])),
                Arc::new(Float64Array::from(vec![Some(0.5)])),
            ],
        )
        .unwrap();
        let out = DataTransformer::new().transform(&raw).await.unwrap();

        let dates = out
            .column_by_name(LAST_REVIEW_DATE)
            .unwrap()
            .as_primitive::<Date32Type>();
        assert_eq!(dates.value(0), 18_037);
        let times = out
            .column_by_name(LAST_REVIEW_TIME)
            .unwrap()
            .as_primitive::<Time64MicrosecondType>();
        assert_eq!(times.value(0), 0);
    }

    #[tokio::test]
    async fn test_group_without_prices_has_null_average() {
        let raw = listings(
            vec![Some("A"), Some("B"), Some("B")],
            vec![Some(80), None, None],
            vec![None, None, None],
            vec![Some(1.0), Some(1.0), Some(1.0)],
        );
        let out = DataTransformer::new().transform(&raw).await.unwrap();

        assert_eq!(f64_column(&out, AVG_PRICE), vec![Some(80.0), None, None]);
    }

    #[tokio::test]
    async fn test_null_prices_excluded_from_mean() {
        let raw = listings(
            vec![Some("A"), Some("A"), Some("A")],
            vec![Some(100), None, Some(300)],
            vec![None, None, None],
            vec![None, None, None],
        );
        let out = DataTransformer::new().transform(&raw).await.unwrap();

        assert_eq!(f64_column(&out, AVG_PRICE), vec![Some(200.0); 3]);
    }

    // Rows without a neighbourhood share one group and average among
    // themselves only. Kept explicit because pandas' default groupby would
    // instead leave them without an average.
    #[tokio::test]
    async fn test_missing_neighbourhood_forms_own_group() {
        let raw = listings(
            vec![Some("A"), None, None],
            vec![Some(100), Some(40), Some(60)],
            vec![None, None, None],
            vec![Some(1.0), Some(1.0), Some(1.0)],
        );
        let out = DataTransformer::new().transform(&raw).await.unwrap();

        assert_eq!(
            f64_column(&out, AVG_PRICE),
            vec![Some(100.0), Some(50.0), Some(50.0)]
        );
    }

    #[test]
    fn test_group_count_includes_unpriced_missing_key() {
        let grouped = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new(NEIGHBOURHOOD, DataType::Utf8, true),
                Field::new(AVG_PRICE, DataType::Float64, true),
            ])),
            vec![
                Arc::new(StringArray::from(vec![Some("A"), None])),
                Arc::new(Float64Array::from(vec![Some(10.0), None])),
            ],
        )
        .unwrap();
        let averages = GroupAverages::from_batches(&[grouped]).unwrap();

        assert_eq!(averages.len(), 2);
        assert_eq!(averages.get(Some("A")), Some(10.0));
        assert_eq!(averages.get(None), None);
        assert_eq!(GroupAverages::default().len(), 0);
    }

    #[tokio::test]
    async fn test_na_markers_from_csv_are_missing_values() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(
            b"id,neighbourhood,price,last_review,reviews_per_month\n\
              1,A,100,2019-01-01,NA\n\
              2,A,NA,,5\n\
              3,NA,50,,\n\
              4,A,200,,1\n",
        )
        .unwrap();
        let raw = crate::reader::read_csv(file.path()).unwrap();
        let out = DataTransformer::new().transform(&raw).await.unwrap();

        assert_eq!(
            f64_column(&out, AVG_PRICE),
            vec![Some(150.0), Some(150.0), Some(50.0), Some(150.0)]
        );
        assert_eq!(
            i64_column(&out, MISSING_REVIEWS_PER_MONTH),
            vec![Some(1), Some(0), Some(1), Some(0)]
        );
        assert_eq!(
            f64_column(&out, REVIEWS_PER_MONTH),
            vec![Some(0.0), Some(5.0), Some(0.0), Some(1.0)]
        );
    }

    #[tokio::test]
    async fn test_raw_table_untouched() {
        let raw = listings(
            vec![Some("A")],
            vec![Some(100)],
            vec![Some("2019-01-01")],
            vec![None],
        );
        let before = raw.clone();
        DataTransformer::new().transform(&raw).await.unwrap();

        assert_eq!(raw, before);
        assert!(raw.column_by_name(REVIEWS_PER_MONTH).unwrap().is_null(0));
    }

    #[tokio::test]
    async fn test_missing_column_fails() {
        let raw = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new(NEIGHBOURHOOD, DataType::Utf8, true),
                Field::new(PRICE, DataType::Int64, true),
                Field::new(REVIEWS_PER_MONTH, DataType::Float64, true),
            ])),
            vec![
                Arc::new(StringArray::from(vec!["A"])),
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Float64Array::from(vec![1.0])),
            ],
        )
        .unwrap();
        let err = DataTransformer::new().transform(&raw).await.unwrap_err();

        assert!(matches!(err, Error::TransformFailed(ref m) if m.contains(LAST_REVIEW)));
    }

    #[tokio::test]
    async fn test_text_price_fails() {
        let raw = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new(NEIGHBOURHOOD, DataType::Utf8, true),
                Field::new(PRICE, DataType::Utf8, true),
                Field::new(LAST_REVIEW, DataType::Utf8, true),
                Field::new(REVIEWS_PER_MONTH, DataType::Float64, true),
            ])),
            vec![
                Arc::new(StringArray::from(vec!["A"])),
                Arc::new(StringArray::from(vec!["$100"])),
                Arc::new(StringArray::from(vec![Some("2019-01-01")])),
                Arc::new(Float64Array::from(vec![1.0])),
            ],
        )
        .unwrap();
        let err = DataTransformer::new().transform(&raw).await.unwrap_err();

        assert!(matches!(err, Error::TransformFailed(_)));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let midnight = 1_558_396_800_000_000;
        assert_eq!(parse_timestamp("2019-05-21"), Some(midnight));
        assert_eq!(parse_timestamp("2019/05/21"), Some(midnight));
        assert_eq!(parse_timestamp("05/21/2019"), Some(midnight));
        assert_eq!(parse_timestamp("2019-05-21T00:00:01"), Some(midnight + 1_000_000));
        assert_eq!(parse_timestamp("2019-05-21T02:00:00+02:00"), Some(midnight));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
