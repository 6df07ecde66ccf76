//! Finalization under contention and after the catalog moved underneath an
//! order.

#![allow(clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::Value;

use techbazaar_core::{Money, OrderStatus};
use techbazaar_integration_tests::{TestApp, location, new_product};

#[tokio::test]
async fn test_concurrent_finalizes_never_oversell() {
    let app = TestApp::spawn().await;
    let gpu = app.add_product(new_product("Graphics Card", 4000, 4, &[])).await;

    let mut orders = Vec::new();
    for account in 30..32 {
        let shopper = app.shopper();
        let email = format!("buyer{account}@example.com");
        shopper.sign_in(account, &email).await;
        shopper.add_to_cart(&gpu, &[], Some(3)).await;
        let order = shopper.place_order(&email).await;
        shopper.pay(&order).await;
        orders.push(order);
    }

    let first = orders[0].order_number.to_string();
    let second = orders[1].order_number.to_string();
    let params_a = [("tran_id", first.as_str()), ("val_id", "VAL-A")];
    let params_b = [("tran_id", second.as_str()), ("val_id", "VAL-B")];
    let (a, b) = tokio::join!(
        app.gateway_callback("success", &params_a),
        app.gateway_callback("success", &params_b),
    );
    let mut locations = vec![location(&a), location(&b)];
    locations.sort();

    assert_eq!(locations[0], "/checkout?notice=finalization_failed");
    assert!(locations[1].starts_with("/orders/complete?"));
    assert_eq!(app.product(&gpu).await.stock, 1);
    assert_eq!(app.store.payments().await.len(), 1);

    let mut statuses = vec![
        app.order(&orders[0].order_number).await.status,
        app.order(&orders[1].order_number).await.status,
    ];
    statuses.sort_by_key(|s| s.as_str());
    assert_eq!(statuses, vec![OrderStatus::Ordered, OrderStatus::Paid]);
}

#[tokio::test]
async fn test_stock_drop_before_payment_keeps_order_payable() {
    let app = TestApp::spawn().await;
    let ssd = app.add_product(new_product("NVMe SSD", 3000, 5, &[])).await;
    let ram = app.add_product(new_product("DDR5 RAM", 2000, 5, &[])).await;

    let shopper = app.shopper();
    shopper.sign_in(40, "shuvo@example.com").await;
    shopper.add_to_cart(&ssd, &[], Some(2)).await;
    shopper.add_to_cart(&ram, &[], Some(1)).await;
    let order = shopper.place_order("shuvo@example.com").await;
    assert_eq!(order.order_total, Money::from_units(8000));
    shopper.pay(&order).await;

    app.store.set_stock(ssd.id, 1).await.expect("set stock");

    let resp = app
        .gateway_callback(
            "success",
            &[
                ("tran_id", order.order_number.as_str()),
                ("val_id", "VAL-DROP"),
                ("amount", "8000.00"),
            ],
        )
        .await;
    let notice = location(&resp);
    assert_eq!(notice, "/checkout?notice=finalization_failed");

    // Nothing was applied
    assert_eq!(app.product(&ssd).await.stock, 1);
    assert_eq!(app.product(&ram).await.stock, 5);
    assert!(app.store.payments().await.is_empty());
    assert_eq!(app.order(&order.order_number).await.status, OrderStatus::Ordered);

    let page: Value = shopper.get(&notice).await.json().await.expect("checkout");
    assert!(page["notice"].as_str().unwrap_or_default().contains("could not be completed"));
    assert_eq!(page["cart"]["lines"].as_array().map(Vec::len), Some(2));

    // Once restocked, the gateway's retry goes through
    app.store.set_stock(ssd.id, 5).await.expect("set stock");
    let resp = app
        .gateway_callback(
            "success",
            &[("tran_id", order.order_number.as_str()), ("val_id", "VAL-DROP")],
        )
        .await;
    assert!(location(&resp).starts_with("/orders/complete?"));
    assert_eq!(app.product(&ssd).await.stock, 3);
    assert_eq!(app.product(&ram).await.stock, 4);
}

#[tokio::test]
async fn test_payment_id_cannot_pay_two_orders() {
    let app = TestApp::spawn().await;
    let cable = app.add_product(new_product("HDMI Cable", 300, 100, &[])).await;

    let mut numbers = Vec::new();
    for account in 50..52 {
        let shopper = app.shopper();
        let email = format!("reuse{account}@example.com");
        shopper.sign_in(account, &email).await;
        shopper.add_to_cart(&cable, &[], None).await;
        let order = shopper.place_order(&email).await;
        shopper.pay(&order).await;
        numbers.push(order.order_number);
    }

    let first = app
        .gateway_callback("success", &[("tran_id", numbers[0].as_str()), ("val_id", "VAL-SAME")])
        .await;
    assert!(location(&first).starts_with("/orders/complete?"));

    let second = app
        .gateway_callback("success", &[("tran_id", numbers[1].as_str()), ("val_id", "VAL-SAME")])
        .await;
    assert_eq!(location(&second), "/");
    assert_eq!(app.order(&numbers[1]).await.status, OrderStatus::Ordered);
    assert_eq!(app.product(&cable).await.stock, 99);
}

#[tokio::test]
async fn test_paid_order_cannot_be_paid_again() {
    let app = TestApp::spawn().await;
    let cable = app.add_product(new_product("HDMI Cable", 300, 100, &[])).await;

    let shopper = app.shopper();
    shopper.sign_in(60, "repeat@example.com").await;
    shopper.add_to_cart(&cable, &[], None).await;
    let order = shopper.place_order("repeat@example.com").await;
    shopper.pay(&order).await;
    app.gateway_callback(
        "success",
        &[("tran_id", order.order_number.as_str()), ("val_id", "VAL-ONCE")],
    )
    .await;

    assert_eq!(shopper.pay(&order).await.status(), StatusCode::CONFLICT);
    assert_eq!(app.gateway.opened().len(), 1);
}
