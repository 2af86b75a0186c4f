//! Sales order number allocation
//!
//! Numbers come from the `so_sequences` counter row of the UTC day. The
//! upsert locks that row until the caller's transaction ends, so concurrent
//! orders on one day serialize and a rolled back order gives its number back.

use chrono::NaiveDate;
use shared::format_so_number;
use sqlx::PgConnection;

use crate::error::{AppError, AppResult};

/// Allocate the next `SO-YYYYMMDD-n` for `day` on the caller's transaction.
///
/// A day without a counter row is seeded from the highest suffix already
/// stored for that day.
pub async fn next_so_number(conn: &mut PgConnection, day: NaiveDate) -> AppResult<String> {
    let sequence: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO so_sequences (day, last_value)
        VALUES (
            $1,
            COALESCE(
                (SELECT MAX(split_part(so_number, '-', 3)::INTEGER)
                 FROM sales_orders
                 WHERE order_date = $1),
                0
            ) + 1
        )
        ON CONFLICT (day) DO UPDATE SET last_value = so_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(day)
    .fetch_one(&mut *conn)
    .await?;

    let sequence = u32::try_from(sequence)
        .map_err(|_| AppError::Internal(format!("SO counter for {} is negative", day)))?;

    let so_number = format_so_number(day, sequence)?;
    tracing::debug!(%day, %so_number, "Allocated SO number");
    Ok(so_number)
}
