//! Row decoding and query execution helpers.

use super::SqlClient;
use crate::Result;
use crate::error::{InventoryError, SanitizedError};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use std::time::Duration;
use tiberius::{FromSql, Query, Row};

/// Extension trait for extracting typed values from tiberius rows
/// with consistent error handling.
pub(crate) trait RowExt {
    /// Extracts a nullable column.
    fn get_field<'a, T>(&'a self, field_name: &str, context: &str) -> Result<Option<T>>
    where
        T: FromSql<'a>;

    /// Extracts a column that must not be NULL.
    fn require_field<'a, T>(&'a self, field_name: &str, context: &str) -> Result<T>
    where
        T: FromSql<'a>,
    {
        self.get_field(field_name, context)?.ok_or_else(|| {
            InventoryError::query_failed(format!(
                "Field '{}' from {} was unexpectedly NULL",
                field_name, context
            ))
        })
    }

    /// Extracts a nullable server-local `datetime` column as UTC.
    fn get_timestamp(
        &self,
        field_name: &str,
        context: &str,
        server_offset: FixedOffset,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_field::<NaiveDateTime>(field_name, context)?
            .map(|naive| local_to_utc(naive, server_offset)))
    }
}

impl RowExt for Row {
    fn get_field<'a, T>(&'a self, field_name: &str, context: &str) -> Result<Option<T>>
    where
        T: FromSql<'a>,
    {
        self.try_get::<T, _>(field_name).map_err(|e| {
            InventoryError::query_failed(format!(
                "Failed to parse field '{}' from {}: {}",
                field_name,
                context,
                SanitizedError::from_error(e)
            ))
        })
    }
}

/// Converts a server-local `datetime` to UTC.
pub(crate) fn local_to_utc(naive: NaiveDateTime, server_offset: FixedOffset) -> DateTime<Utc> {
    naive
        .and_local_timezone(server_offset)
        .single()
        .map_or_else(|| naive.and_utc(), |local| local.with_timezone(&Utc))
}

/// Converts a UTC instant to the server-local `datetime` msdb compares against.
pub(crate) fn utc_to_local(at: DateTime<Utc>, server_offset: FixedOffset) -> NaiveDateTime {
    at.with_timezone(&server_offset).naive_local()
}

/// Runs a query and collects its first result set, bounded by `timeout`.
pub(crate) async fn fetch_rows(
    client: &mut SqlClient,
    query: Query<'_>,
    timeout: Duration,
    context: &str,
) -> Result<Vec<Row>> {
    let run = async {
        let stream = query.query(client).await?;
        let rows = stream.into_first_result().await?;
        Ok::<_, tiberius::error::Error>(rows)
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(rows)) => Ok(rows),
        Ok(Err(e)) => Err(InventoryError::query_failed(format!(
            "Failed to query {}: {}",
            context,
            SanitizedError::from_error(e)
        ))),
        Err(_) => Err(InventoryError::query_failed(format!(
            "Query against {} timed out after {:?}",
            context, timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn naive(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_local_to_utc_applies_server_offset() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            local_to_utc(naive(10), cet),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
        );

        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(
            local_to_utc(naive(22), eastern),
            Utc.with_ymd_and_hms(2024, 3, 2, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_utc_to_local_binds_server_wall_clock() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let threshold = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(utc_to_local(threshold, cet), naive(10));
        assert_eq!(local_to_utc(utc_to_local(threshold, cet), cet), threshold);
    }

    #[test]
    fn test_utc_server_is_unchanged() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(local_to_utc(naive(10), utc), naive(10).and_utc());
    }
}
