use crate::{
    entities::{order, Order, OrderItem, OrderItemModel, OrderModel},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Read-only access to a user's order history.
///
/// Orders are immutable; this service never writes.
#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DatabaseConnection>,
}

impl OrderQueryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists the user's orders, newest first, with snapshot items.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let items = order.find_related(OrderItem).all(&*self.db).await?;
            views.push(OrderView::new(order, items));
        }
        Ok(views)
    }

    /// Fetches one order with its items, enforcing ownership.
    pub async fn get_order_for_user(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No order found.".to_string()))?;

        if order.user_id != user_id {
            return Err(ServiceError::Forbidden("Unauthorized".to_string()));
        }

        let items = order.find_related(OrderItem).all(&*self.db).await?;
        Ok((order, items))
    }
}

/// One historical order as returned to the client.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
    #[serde(rename = "totalAmount")]
    pub total_amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    #[serde(rename = "productId")]
    pub product_id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub description: String,
    pub quantity: i32,
}

impl OrderView {
    fn new(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        let items: Vec<OrderItemView> = items
            .into_iter()
            .map(|item| OrderItemView {
                product_id: item.product_id,
                title: item.title,
                price: item.price,
                description: item.description,
                quantity: item.quantity,
            })
            .collect();
        let total_amount = items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum();
        Self {
            id: order.id,
            session_id: order.session_id,
            user_email: order.user_email,
            created_at: order.created_at,
            items,
            total_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order() -> (OrderModel, Vec<OrderItemModel>) {
        let order_id = Uuid::new_v4();
        (
            OrderModel {
                id: order_id,
                user_id: Uuid::new_v4(),
                user_email: "shopper@example.com".to_string(),
                session_id: "cs_test_1".to_string(),
                created_at: Utc::now(),
            },
            vec![
                OrderItemModel {
                    id: Uuid::new_v4(),
                    order_id,
                    product_id: Uuid::new_v4(),
                    title: "Widget".to_string(),
                    price: dec!(10.00),
                    description: "A widget".to_string(),
                    quantity: 2,
                },
                OrderItemModel {
                    id: Uuid::new_v4(),
                    order_id,
                    product_id: Uuid::new_v4(),
                    title: "Gadget".to_string(),
                    price: dec!(5.25),
                    description: "A gadget".to_string(),
                    quantity: 1,
                },
            ],
        )
    }

    #[test]
    fn view_total_is_quantity_times_snapshot_price() {
        let (order, items) = sample_order();
        let view = OrderView::new(order, items);
        assert_eq!(view.total_amount, dec!(25.25));
        assert_eq!(view.items.len(), 2);
    }

    #[test]
    fn view_serializes_client_field_names() {
        let (order, items) = sample_order();
        let json = serde_json::to_value(OrderView::new(order, items)).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("totalAmount").is_some());
        assert!(json["items"][0].get("productId").is_some());
    }
}
