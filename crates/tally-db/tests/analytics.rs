//! Daily order summary.

mod common;

use chrono::{Days, Utc};
use common::{cents, fixture};
use tally_core::{ItemRequest, NewOrder, OrderSummary, OrderUpdate};

#[tokio::test]
async fn test_daily_summary_totals_todays_orders() {
    let f = fixture().await;
    let gadget = f.add_product("GADGET", 250, 20).await;
    let engine = f.db.engine();

    f.order(vec![
        ItemRequest::new(f.widget.id.clone(), 2),
        ItemRequest::new(gadget.id.clone(), 4),
    ])
    .await;
    let second = engine
        .create_order(NewOrder {
            customer_id: f.customer.id.clone(),
            items: vec![ItemRequest::new(gadget.id.clone(), 1)],
            supplement: cents(150),
        })
        .await
        .unwrap();

    // Updates are reflected; the summary reads current state
    let mut update = OrderUpdate::unchanged_from(&second);
    update.items[0].quantity = 3;
    engine.update_order(&second.order.id, update).await.unwrap();

    let today = Utc::now().date_naive();
    let summary = f.db.orders().daily_summary(today).await.unwrap();

    assert_eq!(summary.products_count, 2 + 4 + 3);
    assert_eq!(summary.products_total, cents(1000 + 1000 + 750));
    assert_eq!(summary.supplements_total, cents(150));
    assert_eq!(summary.amount_to_pay_total, cents(2900));
}

#[tokio::test]
async fn test_daily_summary_excludes_deleted_orders() {
    let f = fixture().await;
    let kept = f.order(vec![ItemRequest::new(f.widget.id.clone(), 1)]).await;
    let dropped = f.order(vec![ItemRequest::new(f.widget.id.clone(), 3)]).await;
    f.db.engine().delete_order(&dropped.order.id).await.unwrap();

    let summary = f.db.orders().daily_summary(Utc::now().date_naive()).await.unwrap();

    assert_eq!(summary.products_count, 1);
    assert_eq!(summary.products_total, kept.total());
}

#[tokio::test]
async fn test_daily_summary_for_a_quiet_day_is_zero() {
    let f = fixture().await;
    f.order(vec![ItemRequest::new(f.widget.id.clone(), 1)]).await;

    let yesterday = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(1))
        .unwrap();
    let summary = f.db.orders().daily_summary(yesterday).await.unwrap();

    assert_eq!(summary, OrderSummary::default());
}
