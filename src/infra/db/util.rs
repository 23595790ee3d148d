use time::OffsetDateTime;

use crate::application::repos::StoreError;
use crate::domain::PostId;

pub fn map_sqlx_error(op: &'static str, id: Option<&PostId>) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| match (err, id) {
        (sqlx::Error::RowNotFound, Some(id)) => StoreError::not_found(id),
        (sqlx::Error::Database(db), Some(id)) if db.is_unique_violation() => {
            StoreError::already_exists(id)
        }
        (other, id) => StoreError::backend(op, id, other),
    }
}

/// Added to unix nanoseconds so every representable timestamp is non-negative.
const SORT_KEY_BIAS: i128 = 10_i128.pow(21);
const SORT_KEY_WIDTH: usize = 22;

/// Fixed-width decimal text whose byte order is chronological order. Covers the full
/// `OffsetDateTime` range, unlike an `i64` nanosecond count.
pub(super) fn sort_key(value: Option<OffsetDateTime>) -> Option<String> {
    value.map(|ts| {
        format!(
            "{:0width$}",
            ts.unix_timestamp_nanos() + SORT_KEY_BIAS,
            width = SORT_KEY_WIDTH
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::PrimitiveDateTime;
    use time::macros::datetime;

    #[test]
    fn sort_keys_order_like_timestamps() {
        let stamps = [
            PrimitiveDateTime::MIN.assume_utc(),
            datetime!(1600-01-01 0:00 UTC),
            datetime!(1969-12-31 23:59:59.999 UTC),
            datetime!(1970-01-01 0:00 UTC),
            datetime!(2024-03-01 9:00 UTC),
            datetime!(2400-06-30 12:00 UTC),
            PrimitiveDateTime::MAX.assume_utc(),
        ];
        let keys: Vec<String> = stamps
            .iter()
            .map(|ts| sort_key(Some(*ts)).expect("key"))
            .collect();

        assert!(keys.iter().all(|key| key.len() == SORT_KEY_WIDTH));
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]), "{keys:?}");
        assert_eq!(sort_key(None), None);
    }
}
