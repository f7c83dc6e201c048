mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::entities::user::UserRole;
use storefront_api::errors::ServiceError;
use storefront_api::services::catalog::UpdateProductInput;
use uuid::Uuid;

#[tokio::test]
async fn add_line_three_times_accumulates_quantity_and_price() {
    let app = TestApp::new().await;
    let user = app.create_user(UserRole::Customer).await;
    let product = app.create_product("Widget", dec!(10)).await;
    let cart = &app.state.services.cart;

    cart.add_line(user.id, product.id).await.unwrap();
    cart.add_line(user.id, product.id).await.unwrap();
    let view = cart.add_line(user.id, product.id).await.unwrap();

    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.items[0].line_total, dec!(30));
    assert_eq!(view.total_sum, dec!(30));
}

#[tokio::test]
async fn decrement_three_times_removes_the_line() {
    let app = TestApp::new().await;
    let user = app.create_user(UserRole::Customer).await;
    let product = app.create_product("Widget", dec!(10)).await;
    let cart = &app.state.services.cart;

    for _ in 0..3 {
        cart.add_line(user.id, product.id).await.unwrap();
    }
    cart.decrement_line(user.id, product.id).await.unwrap();
    cart.decrement_line(user.id, product.id).await.unwrap();
    let view = cart.decrement_line(user.id, product.id).await.unwrap();

    assert!(view.items.is_empty());
    assert_eq!(view.total_sum, dec!(0));
}

#[tokio::test]
async fn decrement_of_absent_product_is_a_safe_no_op() {
    let app = TestApp::new().await;
    let user = app.create_user(UserRole::Customer).await;
    let in_cart = app.create_product("Widget", dec!(10)).await;
    let not_in_cart = app.create_product("Gadget", dec!(5.25)).await;
    let cart = &app.state.services.cart;

    cart.add_line(user.id, in_cart.id).await.unwrap();
    let view = cart.decrement_line(user.id, not_in_cart.id).await.unwrap();

    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 1);
    assert_eq!(view.total_sum, dec!(10));
}

#[tokio::test]
async fn delete_line_removes_regardless_of_quantity() {
    let app = TestApp::new().await;
    let user = app.create_user(UserRole::Customer).await;
    let product = app.create_product("Widget", dec!(10)).await;
    let cart = &app.state.services.cart;

    for _ in 0..5 {
        cart.add_line(user.id, product.id).await.unwrap();
    }
    let view = cart.delete_line(user.id, product.id).await.unwrap();

    assert!(view.items.is_empty());
}

#[tokio::test]
async fn add_line_for_unknown_product_fails_not_found() {
    let app = TestApp::new().await;
    let user = app.create_user(UserRole::Customer).await;

    let err = app
        .state
        .services
        .cart
        .add_line(user.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn cart_read_for_unknown_user_fails_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .cart
        .get_cart(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn line_total_accumulates_price_at_time_of_each_add() {
    let app = TestApp::new().await;
    let user = app.create_user(UserRole::Customer).await;
    let product = app.create_product("Widget", dec!(10)).await;
    let cart = &app.state.services.cart;

    cart.add_line(user.id, product.id).await.unwrap();

    // Reprice the catalog entry between adds: the line keeps its history.
    app.state
        .services
        .catalog
        .update_product(
            product.id,
            UpdateProductInput {
                price: Some(dec!(12.5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let view = cart.add_line(user.id, product.id).await.unwrap();
    assert_eq!(view.items[0].quantity, 2);
    assert_eq!(view.items[0].line_total, dec!(22.5));
}

#[tokio::test]
async fn carts_of_distinct_users_are_isolated() {
    let app = TestApp::new().await;
    let alice = app.create_user(UserRole::Customer).await;
    let bob = app.create_user(UserRole::Customer).await;
    let product = app.create_product("Widget", dec!(10)).await;
    let cart = &app.state.services.cart;

    cart.add_line(alice.id, product.id).await.unwrap();

    let bob_view = cart.get_cart(bob.id).await.unwrap();
    assert!(bob_view.items.is_empty());

    let alice_view = cart.get_cart(alice.id).await.unwrap();
    assert_eq!(alice_view.items.len(), 1);
}

#[tokio::test]
async fn concurrent_adds_for_one_user_do_not_lose_updates() {
    let app = TestApp::new().await;
    let user = app.create_user(UserRole::Customer).await;
    let product = app.create_product("Widget", dec!(10)).await;
    let cart = app.state.services.cart.clone();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cart = cart.clone();
        let user_id = user.id;
        let product_id = product.id;
        handles.push(tokio::spawn(async move {
            cart.add_line(user_id, product_id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let view = cart.get_cart(user.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 4);
    assert_eq!(view.items[0].line_total, dec!(40));
}
