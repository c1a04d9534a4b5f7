use sqlx::SqliteConnection;

use crate::db_types::CartItem;

/// Adds items to a cart line, creating it if needed.
pub async fn add_item(
    customer_id: &str,
    sku: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO cart_items (customer_id, sku, quantity) VALUES ($1, $2, $3)
            ON CONFLICT(customer_id, sku) DO UPDATE SET quantity = quantity + excluded.quantity
            RETURNING *;
        "#,
    )
    .bind(customer_id)
    .bind(sku)
    .bind(quantity)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_cart(customer_id: &str, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM cart_items WHERE customer_id = $1 ORDER BY added_at, id")
        .bind(customer_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn clear_cart(customer_id: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_items WHERE customer_id = $1").bind(customer_id).execute(conn).await?;
    Ok(result.rows_affected())
}
