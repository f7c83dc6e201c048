use crate::{
    entities::{order, order_item, Order, User},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::PaymentProvider,
    services::cart::CartService,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a finalization attempt for a paid session.
///
/// The session's implicit lifecycle (pending, confirmed, committed) is
/// reconstructed from the provider's payment status plus the presence of an
/// order row; this type makes the committed half of it explicit instead of
/// leaving callers to re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// A new order was created and the cart cleared.
    Committed { order_id: Uuid },
    /// An order for this session already existed; nothing was re-committed.
    AlreadyCommitted,
}

/// Converts a confirmed payment into exactly one durable order.
///
/// Both confirmation triggers, the browser redirect and the provider
/// webhook, call [`OrderFinalizer::finalize_session`]; neither carries its
/// own commit logic. The `orders.session_id` unique constraint is the
/// storage-level guard that makes the conversion effectively exactly-once
/// even when the two triggers race.
#[derive(Clone)]
pub struct OrderFinalizer {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
    cart: Arc<CartService>,
    event_sender: Arc<EventSender>,
}

impl OrderFinalizer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        cart: Arc<CartService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            provider,
            cart,
            event_sender,
        }
    }

    /// Idempotent commit of a checkout session.
    ///
    /// 1. The provider is asked for the session's payment status; anything
    ///    but paid fails with `PaymentNotConfirmed`.
    /// 2. An existing order for the session short-circuits to
    ///    `AlreadyCommitted`. A cart left populated by a crash between
    ///    insert and clear is cleared here; an already-empty cart is not
    ///    re-written.
    /// 3. Otherwise the cart is snapshotted into an order inside one
    ///    transaction. A unique-constraint conflict on `session_id` means a
    ///    concurrent caller won the insert and is treated as
    ///    `AlreadyCommitted`.
    /// 4. The cart is cleared only after the insert transaction commits, so
    ///    a crash in between is recovered by the short-circuit on retry.
    #[instrument(skip(self))]
    pub async fn finalize_session(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<FinalizeOutcome, ServiceError> {
        let session = self.provider.retrieve_checkout_session(session_id).await?;
        if !session.is_paid() {
            return Err(ServiceError::PaymentNotConfirmed);
        }

        if self.order_exists(session_id).await? {
            self.recover_uncleared_cart(user_id).await?;
            return Ok(FinalizeOutcome::AlreadyCommitted);
        }

        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found!".to_string()))?;

        let lines = self.cart.resolved_lines(user_id).await?;
        if lines.is_empty() {
            // Only the finalizer clears carts after checkout, so an empty
            // cart with no order row means the shopper emptied it while the
            // payment was in flight. Surface rather than commit a zero-line
            // order; the cart is untouched and the call is retryable.
            return Err(ServiceError::CommitFailed(format!(
                "no cart lines to commit for session {}",
                session_id
            )));
        }

        let order_id = Uuid::new_v4();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| ServiceError::CommitFailed(e.to_string()))?;

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            user_email: Set(user.email),
            session_id: Set(session_id.to_string()),
            created_at: Set(Utc::now()),
        };

        if let Err(e) = order.insert(&txn).await {
            let _ = txn.rollback().await;
            if ServiceError::is_unique_violation(&e) {
                // Lost the race against the other trigger.
                warn!(
                    "Concurrent commit detected for session {}; treating as already committed",
                    session_id
                );
                self.recover_uncleared_cart(user_id).await?;
                return Ok(FinalizeOutcome::AlreadyCommitted);
            }
            return Err(ServiceError::CommitFailed(e.to_string()));
        }

        for (line, product) in &lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                title: Set(product.title.clone()),
                price: Set(product.price),
                description: Set(product.description.clone()),
                quantity: Set(line.quantity),
            };
            if let Err(e) = item.insert(&txn).await {
                let _ = txn.rollback().await;
                return Err(ServiceError::CommitFailed(e.to_string()));
            }
        }

        txn.commit()
            .await
            .map_err(|e| ServiceError::CommitFailed(e.to_string()))?;

        // The order is durable from here on; clearing must not precede it.
        self.cart.clear_cart(user_id).await?;

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;

        info!(
            "Committed order {} for session {} (user {})",
            order_id, session_id, user_id
        );
        Ok(FinalizeOutcome::Committed { order_id })
    }

    async fn order_exists(&self, session_id: &str) -> Result<bool, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::SessionId.eq(session_id))
            .one(&*self.db)
            .await?
            .is_some())
    }

    /// Clears a cart left behind by a crash between order insert and cart
    /// clear. A cart that is already empty is left alone.
    async fn recover_uncleared_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if self.cart.line_count(user_id).await? > 0 {
            warn!(
                "Cart for user {} still populated after commit; clearing on retry",
                user_id
            );
            self.cart.clear_cart(user_id).await?;
        }
        Ok(())
    }
}
