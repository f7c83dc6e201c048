use crate::{
    entities::{product, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Products shown per catalog page.
const ITEMS_PER_PAGE: u64 = 8;

fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Price must be greater than 0".into());
        Err(err)
    }
}

/// Catalog lookup and administration.
///
/// The cart and checkout flow only reads from here; writes are reserved for
/// administrators.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Looks up a single product.
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found!".to_string()))
    }

    /// Returns one page of the catalog, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(&self, page: u64) -> Result<ProductPage, ServiceError> {
        let page = page.max(1);
        let paginator = Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, ITEMS_PER_PAGE);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage::new(products, page, total))
    }

    /// Creates a catalog product (admin operation).
    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        let product_id = Uuid::new_v4();
        let product = product::ActiveModel {
            id: Set(product_id),
            title: Set(input.title),
            price: Set(input.price),
            description: Set(input.description),
            image_url: Set(input.image_url),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        let product = product.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!("Created product: {}", product_id);
        Ok(product)
    }

    /// Updates a catalog product (admin operation). Orders are unaffected:
    /// they carry their own snapshots.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found!".to_string()))?;

        let mut active: product::ActiveModel = product.into();
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(image_url);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        Ok(updated)
    }

    /// Deletes a catalog product (admin operation).
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let result = Product::delete_by_id(product_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Product not found!".to_string()));
        }

        self.event_sender
            .send_or_log(Event::ProductDeleted(product_id))
            .await;

        info!("Deleted product: {}", product_id);
        Ok(())
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub title: String,
    #[validate(custom = "validate_positive_decimal")]
    pub price: Decimal,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub description: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub image_url: String,
}

/// Input for updating a product; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub title: Option<String>,
    #[validate(custom = "validate_positive_decimal")]
    pub price: Option<Decimal>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub image_url: Option<String>,
}

/// One page of the catalog, with the paging metadata the client renders.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub prods: Vec<ProductModel>,
    #[serde(rename = "currentPage")]
    pub current_page: u64,
    #[serde(rename = "hasNextPage")]
    pub has_next_page: bool,
    #[serde(rename = "hasPreviousPage")]
    pub has_previous_page: bool,
    #[serde(rename = "nextPage")]
    pub next_page: u64,
    #[serde(rename = "previousPage")]
    pub previous_page: u64,
    #[serde(rename = "lastPage")]
    pub last_page: u64,
}

impl ProductPage {
    fn new(products: Vec<ProductModel>, page: u64, total: u64) -> Self {
        Self {
            prods: products,
            current_page: page,
            has_next_page: ITEMS_PER_PAGE * page < total,
            has_previous_page: page > 1,
            next_page: page + 1,
            previous_page: page.saturating_sub(1),
            last_page: total.div_ceil(ITEMS_PER_PAGE),
        }
    }
}
