use crate::{
    entities::{cart_item, CartItem, CartItemModel, Product, ProductModel, User},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Per-user shopping cart store.
///
/// Each mutation is a read-modify-write over the user's cart lines. Naive
/// interleaving of two mutations for the same user loses updates (double
/// click on "add to cart"), so mutations for one user serialize on a
/// per-user mutex; different users proceed concurrently.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    user_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            user_locks: Arc::new(DashMap::new()),
        }
    }

    async fn lock_user(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = self
            .user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Adds one unit of a product to the user's cart.
    ///
    /// An existing line gains quantity 1 and the product's current unit
    /// price on top of its accumulated total; otherwise a fresh line starts
    /// at quantity 1. The accumulated total is a display estimate; checkout
    /// re-prices from the live catalog.
    #[instrument(skip(self))]
    pub async fn add_line(&self, user_id: Uuid, product_id: Uuid) -> Result<CartView, ServiceError> {
        let _guard = self.lock_user(user_id).await;
        let txn = self.db.begin().await?;

        self.ensure_user_exists(&txn, user_id).await?;
        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found!".to_string()))?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(line) => {
                let quantity = line.quantity + 1;
                let line_total = line.line_total + product.price;
                let mut line: cart_item::ActiveModel = line.into();
                line.quantity = Set(quantity);
                line.line_total = Set(line_total);
                line.updated_at = Set(Utc::now());
                line.update(&txn).await?;
            }
            None => {
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    quantity: Set(1),
                    line_total: Set(product.price),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                line.insert(&txn).await?;
            }
        }

        let view = self.read_view(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded { user_id, product_id })
            .await;

        info!("Added product {} to cart of user {}", product_id, user_id);
        Ok(view)
    }

    /// Removes one unit of a product from the user's cart.
    ///
    /// Quantity and accumulated total shrink by one unit; a line reaching
    /// quantity 0 is removed. Decrementing a product that is not in the cart
    /// succeeds with zero effect.
    #[instrument(skip(self))]
    pub async fn decrement_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let _guard = self.lock_user(user_id).await;
        let txn = self.db.begin().await?;

        self.ensure_user_exists(&txn, user_id).await?;
        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found!".to_string()))?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(line) if line.quantity <= 1 => {
                line.delete(&txn).await?;
            }
            Some(line) => {
                let quantity = line.quantity - 1;
                let line_total = line.line_total - product.price;
                let mut line: cart_item::ActiveModel = line.into();
                line.quantity = Set(quantity);
                line.line_total = Set(line_total);
                line.updated_at = Set(Utc::now());
                line.update(&txn).await?;
            }
            None => {
                debug!(
                    "Decrement for product {} not in cart of user {}; no effect",
                    product_id, user_id
                );
            }
        }

        let view = self.read_view(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { user_id, product_id })
            .await;

        Ok(view)
    }

    /// Removes a product's line entirely, whatever its quantity.
    #[instrument(skip(self))]
    pub async fn delete_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let _guard = self.lock_user(user_id).await;
        let txn = self.db.begin().await?;

        self.ensure_user_exists(&txn, user_id).await?;
        // The product must still exist, mirroring add/decrement, so a stale
        // client gets a consistent 404 rather than a silent success.
        Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found!".to_string()))?;

        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;

        let view = self.read_view(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { user_id, product_id })
            .await;

        Ok(view)
    }

    /// Returns the user's cart with resolved product snapshots.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        self.ensure_user_exists(&*self.db, user_id).await?;
        self.read_view(&*self.db, user_id).await
    }

    /// Returns the raw cart lines paired with their products.
    ///
    /// Checkout and finalization consume this to compute live-priced totals
    /// and snapshots.
    pub async fn resolved_lines(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(CartItemModel, ProductModel)>, ServiceError> {
        self.resolved_lines_on(&*self.db, user_id).await
    }

    /// Empties the user's cart. Invoked by the order finalizer once the
    /// order insert is durable.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let _guard = self.lock_user(user_id).await;

        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(user_id)).await;

        info!("Cleared cart for user {}", user_id);
        Ok(())
    }

    /// Number of lines currently in the user's cart.
    pub async fn line_count(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        use sea_orm::PaginatorTrait;
        Ok(CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await?)
    }

    async fn ensure_user_exists(
        &self,
        conn: &impl sea_orm::ConnectionTrait,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        User::find_by_id(user_id)
            .one(conn)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound("User not found!".to_string()))
    }

    async fn resolved_lines_on(
        &self,
        conn: &impl sea_orm::ConnectionTrait,
        user_id: Uuid,
    ) -> Result<Vec<(CartItemModel, ProductModel)>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(line, product)| match product {
                Some(product) => Some((line, product)),
                None => {
                    // A line can outlive its product if the catalog entry is
                    // deleted; such lines are invisible to the cart view.
                    debug!("Cart line {} references a deleted product", line.id);
                    None
                }
            })
            .collect())
    }

    async fn read_view(
        &self,
        conn: &impl sea_orm::ConnectionTrait,
        user_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let lines = self.resolved_lines_on(conn, user_id).await?;
        Ok(CartView::from_lines(lines))
    }
}

/// Product fields resolved into a cart line.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub description: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

impl From<ProductModel> for ProductSummary {
    fn from(product: ProductModel) -> Self {
        Self {
            id: product.id,
            title: product.title,
            price: product.price,
            description: product.description,
            image_url: product.image_url,
        }
    }
}

/// One line of the cart as returned to the client.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product: ProductSummary,
    pub quantity: i32,
    #[serde(rename = "lineTotal")]
    pub line_total: Decimal,
}

/// The cart projection: resolved lines plus the accumulated total.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    #[serde(rename = "totalSum")]
    pub total_sum: Decimal,
}

impl CartView {
    fn from_lines(lines: Vec<(CartItemModel, ProductModel)>) -> Self {
        let items: Vec<CartLineView> = lines
            .into_iter()
            .map(|(line, product)| CartLineView {
                product: product.into(),
                quantity: line.quantity,
                line_total: line.line_total,
            })
            .collect();
        let total_sum = items.iter().map(|item| item.line_total).sum();
        Self { items, total_sum }
    }
}
