//! Sales order service: order creation, order updates and line deletion
//!
//! Each write runs in one transaction. An early return through `?` drops the
//! transaction, which rolls it back and hands the connection back to the pool.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    can_delete_product, new_items, plan_purchase_requests, validate_order_items, CreateOrderInput,
    OrderFields, OrderItemInput, PurchasePlan, PurchaseRequest, SalesLineItem, SalesOrder,
    SoStatus, StoredLine, UpdateOrderInput,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::identifier::next_so_number;
use crate::services::purchase::{purchase_columns, PurchaseRow};

const ORDER_COLUMNS: &str = "so_number, order_date, customer_name, customer_email, customer_phone, \
     customer_address, shipping_address, delivery_date, payment_status, payment_method, \
     total_paid_amount, discount, gst, notes, is_active, created_by, changed_by, created_at, updated_at";

const LINE_COLUMNS: &str = "id, so_number, product_id, supplier_id, qty, price, total_price, \
     in_stock, so_status, is_active, created_by, changed_by, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    so_number: String,
    order_date: NaiveDate,
    customer_name: String,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    customer_address: Option<String>,
    shipping_address: Option<String>,
    delivery_date: Option<NaiveDate>,
    payment_status: Option<String>,
    payment_method: Option<String>,
    total_paid_amount: Decimal,
    discount: Decimal,
    gst: Decimal,
    notes: Option<String>,
    is_active: bool,
    created_by: String,
    changed_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for SalesOrder {
    fn from(row: OrderRow) -> Self {
        SalesOrder {
            so_number: row.so_number,
            order_date: row.order_date,
            fields: OrderFields {
                customer_name: row.customer_name,
                customer_email: row.customer_email,
                customer_phone: row.customer_phone,
                customer_address: row.customer_address,
                shipping_address: row.shipping_address,
                delivery_date: row.delivery_date,
                payment_status: row.payment_status,
                payment_method: row.payment_method,
                total_paid_amount: row.total_paid_amount,
                discount: row.discount,
                gst: row.gst,
                notes: row.notes,
            },
            is_active: row.is_active,
            created_by: row.created_by,
            changed_by: row.changed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: i64,
    so_number: String,
    product_id: String,
    supplier_id: i64,
    qty: i32,
    price: Decimal,
    total_price: Decimal,
    in_stock: bool,
    so_status: String,
    is_active: bool,
    created_by: String,
    changed_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LineRow> for SalesLineItem {
    type Error = AppError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        let so_status = row.so_status.parse::<SoStatus>().map_err(AppError::Internal)?;
        Ok(SalesLineItem {
            id: row.id,
            so_number: row.so_number,
            product_id: row.product_id,
            supplier_id: row.supplier_id,
            qty: row.qty,
            price: row.price,
            total_price: row.total_price,
            check: row.in_stock,
            so_status,
            is_active: row.is_active,
            created_by: row.created_by,
            changed_by: row.changed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Result of creating an order
#[derive(Debug, Clone)]
pub enum CreateOrderOutcome {
    /// Some lines needed purchasing
    Created {
        so_number: String,
        lines: Vec<SalesLineItem>,
        purchase_requests: Vec<PurchaseRequest>,
    },
    /// Every line was in stock
    CreatedWithoutPurchaseRequests {
        so_number: String,
        lines: Vec<SalesLineItem>,
    },
}

impl CreateOrderOutcome {
    pub fn so_number(&self) -> &str {
        match self {
            CreateOrderOutcome::Created { so_number, .. }
            | CreateOrderOutcome::CreatedWithoutPurchaseRequests { so_number, .. } => so_number,
        }
    }
}

/// Result of updating an order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderOutcome {
    pub so_number: String,
    pub added_lines: Vec<SalesLineItem>,
    pub purchase_requests: Vec<PurchaseRequest>,
}

/// Result of deleting one line
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedLine {
    pub so_number: String,
    pub product_id: String,
    pub sales_id: i64,
    /// Purchase requests retired along with the line
    pub retired_purchase_requests: Vec<i64>,
}

/// An order with its active lines and purchase requests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: SalesOrder,
    pub lines: Vec<SalesLineItem>,
    pub purchase_requests: Vec<PurchaseRequest>,
}

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create an order with its lines and the purchase requests for lines
    /// that are not in stock
    pub async fn create_order(
        &self,
        input: CreateOrderInput,
        actor: &str,
    ) -> AppResult<CreateOrderOutcome> {
        validate_order_items(&input.items)?;
        input.validate()?;

        // One timestamp for every row of the order
        let now = Utc::now();
        let day = now.date_naive();

        let mut tx = self.db.begin().await?;

        ensure_suppliers(&mut tx, input.items.iter()).await?;

        let so_number = next_so_number(&mut tx, day).await?;

        sqlx::query(
            r#"
            INSERT INTO sales_orders (
                so_number, order_date, customer_name, customer_email, customer_phone,
                customer_address, shipping_address, delivery_date, payment_status, payment_method,
                total_paid_amount, discount, gst, notes, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            "#,
        )
        .bind(&so_number)
        .bind(day)
        .bind(&input.fields.customer_name)
        .bind(&input.fields.customer_email)
        .bind(&input.fields.customer_phone)
        .bind(&input.fields.customer_address)
        .bind(&input.fields.shipping_address)
        .bind(input.fields.delivery_date)
        .bind(&input.fields.payment_status)
        .bind(&input.fields.payment_method)
        .bind(input.fields.total_paid_amount)
        .bind(input.fields.discount)
        .bind(input.fields.gst)
        .bind(&input.fields.notes)
        .bind(actor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let lines = insert_lines(&mut tx, &so_number, &input.items, actor, now).await?;

        // SalesIDs come back keyed by product, never by position
        let sales_ids: HashMap<String, i64> = lines
            .iter()
            .map(|line| (line.product_id.clone(), line.id))
            .collect();
        let plans = plan_purchase_requests(&input.items, &sales_ids)?;

        if plans.is_empty() {
            tx.commit().await?;
            tracing::info!(%so_number, lines = lines.len(), user = %actor, "Order created, all lines in stock");
            return Ok(CreateOrderOutcome::CreatedWithoutPurchaseRequests { so_number, lines });
        }

        let purchase_requests = insert_purchase_requests(&mut tx, &plans, actor, now).await?;

        tx.commit().await?;

        tracing::info!(
            %so_number,
            lines = lines.len(),
            purchase_requests = purchase_requests.len(),
            user = %actor,
            "Order created"
        );

        Ok(CreateOrderOutcome::Created {
            so_number,
            lines,
            purchase_requests,
        })
    }

    /// Add new lines to an order and rewrite its shared fields.
    ///
    /// Lines already stored must be resubmitted unchanged; resubmitting the
    /// stored item list only rewrites the shared fields.
    pub async fn update_order(
        &self,
        so_number: &str,
        input: UpdateOrderInput,
        actor: &str,
    ) -> AppResult<UpdateOrderOutcome> {
        validate_order_items(&input.items)?;
        input.validate()?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query_scalar::<_, String>(
            "SELECT so_number FROM sales_orders WHERE so_number = $1 AND is_active FOR UPDATE",
        )
        .bind(so_number)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sales order {}", so_number)))?;

        let stored: Vec<StoredLine> = fetch_lines(&mut tx, so_number)
            .await?
            .iter()
            .map(|line| StoredLine {
                product_id: line.product_id.clone(),
                supplier_id: line.supplier_id,
                qty: line.qty,
                price: line.price,
                total_price: line.total_price,
                check: line.check,
            })
            .collect();

        let fresh = new_items(&stored, &input.items)?;

        let mut added_lines = Vec::with_capacity(fresh.len());
        let mut sales_ids = HashMap::with_capacity(fresh.len());
        if !fresh.is_empty() {
            ensure_suppliers(&mut tx, fresh.iter().copied()).await?;

            for item in &fresh {
                let line = insert_line(&mut tx, so_number, item, actor, now).await?;
                sales_ids.insert(line.product_id.clone(), line.id);
                added_lines.push(line);
            }
        }

        let plans = plan_purchase_requests(fresh.iter().copied(), &sales_ids)?;
        let purchase_requests = if plans.is_empty() {
            Vec::new()
        } else {
            insert_purchase_requests(&mut tx, &plans, actor, now).await?
        };

        let fields = &input.fields;
        sqlx::query(
            r#"
            UPDATE sales_orders
            SET customer_name = $2,
                customer_email = $3,
                customer_phone = $4,
                customer_address = $5,
                shipping_address = $6,
                delivery_date = $7,
                payment_status = $8,
                payment_method = $9,
                total_paid_amount = $10,
                discount = $11,
                gst = $12,
                notes = $13,
                changed_by = $14,
                updated_at = $15
            WHERE so_number = $1 AND is_active
            "#,
        )
        .bind(so_number)
        .bind(&fields.customer_name)
        .bind(&fields.customer_email)
        .bind(&fields.customer_phone)
        .bind(&fields.customer_address)
        .bind(&fields.shipping_address)
        .bind(fields.delivery_date)
        .bind(&fields.payment_status)
        .bind(&fields.payment_method)
        .bind(fields.total_paid_amount)
        .bind(fields.discount)
        .bind(fields.gst)
        .bind(&fields.notes)
        .bind(actor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            %so_number,
            added_lines = added_lines.len(),
            purchase_requests = purchase_requests.len(),
            user = %actor,
            "Order updated"
        );

        Ok(UpdateOrderOutcome {
            so_number: so_number.to_string(),
            added_lines,
            purchase_requests,
        })
    }

    /// Hard-delete one line, retiring its purchase request.
    ///
    /// Refused once the goods reached the warehouse or the customer, and from
    /// the delivery date on.
    pub async fn delete_line_item(
        &self,
        so_number: &str,
        product_code: &str,
        actor: &str,
    ) -> AppResult<DeletedLine> {
        let today = Utc::now().date_naive();
        let mut tx = self.db.begin().await?;

        let (sales_id, so_status, delivery_date) =
            sqlx::query_as::<_, (i64, String, Option<NaiveDate>)>(
                r#"
                SELECT l.id, l.so_status, o.delivery_date
                FROM sales_line_items l
                JOIN sales_orders o ON o.so_number = l.so_number
                WHERE l.so_number = $1 AND l.product_id = $2 AND l.is_active
                FOR UPDATE OF l
                "#,
            )
            .bind(so_number)
            .bind(product_code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Product {} on sales order {}", product_code, so_number))
            })?;

        let so_status = so_status.parse::<SoStatus>().map_err(AppError::Internal)?;
        if !can_delete_product(so_status, delivery_date, today) {
            return Err(AppError::DeletionForbidden(format!(
                "Product {} on {} can no longer be deleted (status '{}', delivery date {})",
                product_code,
                so_number,
                so_status,
                delivery_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "not set".to_string())
            )));
        }

        let retired_purchase_requests: Vec<i64> = sqlx::query_scalar(
            r#"
            UPDATE purchase_requests
            SET is_active = FALSE, changed_by = $2, updated_at = NOW()
            WHERE sales_id = $1 AND is_active
            RETURNING id
            "#,
        )
        .bind(sales_id)
        .bind(actor)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM sales_line_items WHERE id = $1")
            .bind(sales_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted != 1 {
            return Err(AppError::Internal(format!(
                "expected to delete one sales line, deleted {}",
                deleted
            )));
        }

        tx.commit().await?;

        tracing::info!(
            %so_number,
            product_id = %product_code,
            sales_id,
            retired = ?retired_purchase_requests,
            user = %actor,
            "Sales line deleted"
        );

        Ok(DeletedLine {
            so_number: so_number.to_string(),
            product_id: product_code.to_string(),
            sales_id,
            retired_purchase_requests,
        })
    }

    /// Get an order with its active lines and purchase requests
    pub async fn get_order(&self, so_number: &str) -> AppResult<OrderDetail> {
        let mut conn = self.db.acquire().await?;

        let sql = format!(
            "SELECT {} FROM sales_orders WHERE so_number = $1 AND is_active",
            ORDER_COLUMNS
        );
        let order: SalesOrder = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(so_number)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sales order {}", so_number)))?
            .into();

        let lines = fetch_lines(&mut conn, so_number).await?;

        let sql = format!(
            r#"
            SELECT {}
            FROM purchase_requests pr
            JOIN sales_line_items l ON l.id = pr.sales_id
            WHERE l.so_number = $1 AND l.is_active AND pr.is_active
            ORDER BY pr.id
            "#,
            purchase_columns(Some("pr"))
        );
        let purchase_requests = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(so_number)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(PurchaseRequest::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(OrderDetail {
            order,
            lines,
            purchase_requests,
        })
    }
}

/// Reject items pointing at unknown or inactive suppliers
async fn ensure_suppliers<'a, I>(conn: &mut PgConnection, items: I) -> AppResult<()>
where
    I: IntoIterator<Item = &'a OrderItemInput>,
{
    let mut supplier_ids: Vec<i64> = items.into_iter().map(|item| item.supplier_id).collect();
    supplier_ids.sort_unstable();
    supplier_ids.dedup();

    let known: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM suppliers WHERE id = ANY($1) AND is_active")
            .bind(&supplier_ids)
            .fetch_all(&mut *conn)
            .await?;

    let unknown: Vec<String> = supplier_ids
        .iter()
        .filter(|id| !known.contains(id))
        .map(|id| id.to_string())
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(
            "items.supplierId",
            format!("Unknown or inactive supplier(s): {}", unknown.join(", ")),
        ))
    }
}

async fn fetch_lines(conn: &mut PgConnection, so_number: &str) -> AppResult<Vec<SalesLineItem>> {
    let sql = format!(
        "SELECT {} FROM sales_line_items WHERE so_number = $1 AND is_active ORDER BY id",
        LINE_COLUMNS
    );
    sqlx::query_as::<_, LineRow>(&sql)
        .bind(so_number)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(SalesLineItem::try_from)
        .collect()
}

/// Bulk insert the lines of a new order
async fn insert_lines(
    conn: &mut PgConnection,
    so_number: &str,
    items: &[OrderItemInput],
    actor: &str,
    now: DateTime<Utc>,
) -> AppResult<Vec<SalesLineItem>> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO sales_line_items \
         (so_number, product_id, supplier_id, qty, price, total_price, in_stock, so_status, \
          created_by, created_at, updated_at) ",
    );
    builder.push_values(items, |mut row, item| {
        row.push_bind(so_number.to_string())
            .push_bind(item.product_id.clone())
            .push_bind(item.supplier_id)
            .push_bind(item.qty)
            .push_bind(item.price)
            .push_bind(item.total_price)
            .push_bind(item.check)
            .push_bind(SoStatus::NotDelivered.as_str())
            .push_bind(actor.to_string())
            .push_bind(now)
            .push_bind(now);
    });
    builder.push(" RETURNING ");
    builder.push(LINE_COLUMNS);

    builder
        .build_query_as::<LineRow>()
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(SalesLineItem::try_from)
        .collect()
}

/// Insert one line added by an order update
async fn insert_line(
    conn: &mut PgConnection,
    so_number: &str,
    item: &OrderItemInput,
    actor: &str,
    now: DateTime<Utc>,
) -> AppResult<SalesLineItem> {
    let sql = format!(
        r#"
        INSERT INTO sales_line_items
            (so_number, product_id, supplier_id, qty, price, total_price, in_stock, so_status,
             created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        RETURNING {}
        "#,
        LINE_COLUMNS
    );
    sqlx::query_as::<_, LineRow>(&sql)
        .bind(so_number)
        .bind(&item.product_id)
        .bind(item.supplier_id)
        .bind(item.qty)
        .bind(item.price)
        .bind(item.total_price)
        .bind(item.check)
        .bind(SoStatus::NotDelivered.as_str())
        .bind(actor)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?
        .try_into()
}

async fn insert_purchase_requests(
    conn: &mut PgConnection,
    plans: &[PurchasePlan],
    actor: &str,
    now: DateTime<Utc>,
) -> AppResult<Vec<PurchaseRequest>> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO purchase_requests \
         (sales_id, product_id, supplier_id, po_status, created_by, created_at, updated_at) ",
    );
    builder.push_values(plans, |mut row, plan| {
        row.push_bind(plan.sales_id)
            .push_bind(plan.product_id.clone())
            .push_bind(plan.supplier_id)
            .push_bind(shared::PoStatus::NotOrdered.as_str())
            .push_bind(actor.to_string())
            .push_bind(now)
            .push_bind(now);
    });
    builder.push(" RETURNING ");
    builder.push(purchase_columns(None));

    builder
        .build_query_as::<PurchaseRow>()
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(PurchaseRequest::try_from)
        .collect()
}
