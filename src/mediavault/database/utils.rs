use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::Row;
use url::Url;

/// Parses a timestamp column stored either as INTEGER milliseconds or as a
/// SQLite TEXT datetime (`CURRENT_TIMESTAMP` style, with or without fraction).
pub(crate) fn parse_timestamp<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<DateTime<Utc>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    if let Ok(timestamp_ms) = row.try_get::<i64, _>(column_name) {
        return DateTime::from_timestamp_millis(timestamp_ms)
            .ok_or_else(|| create_column_decode_error(column_name, "Invalid timestamp value"));
    }

    if let Ok(datetime_str) = row.try_get::<String, _>(column_name) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&datetime_str) {
            return Ok(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive_dt) = NaiveDateTime::parse_from_str(&datetime_str, format) {
                return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }
        return Err(create_column_decode_error(
            column_name,
            &format!("Could not parse datetime string: '{}'", datetime_str),
        ));
    }

    Err(create_column_decode_error(
        column_name,
        "Could not parse as INTEGER or DATETIME",
    ))
}

/// Decodes a nullable TEXT column holding an absolute URL.
pub(crate) fn parse_optional_url<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<Option<Url>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    row.try_get::<Option<String>, _>(column_name)?
        .map(|raw| {
            Url::parse(&raw).map_err(|e| sqlx::Error::ColumnDecode {
                index: column_name.to_string(),
                source: Box::new(e),
            })
        })
        .transpose()
}

pub(crate) fn create_column_decode_error(column_name: &str, message: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column_name.to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.to_string(),
        )),
    }
}
