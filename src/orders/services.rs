use std::sync::Arc;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cart;
use crate::email::{self, Mailer};
use crate::error::ApiError;
use crate::models::{Order, OrderItem, OrderStatus, User};
use crate::orders::dto::{OrderCreateRequest, PlacedOrder};
use crate::store::Store;

/// Orders at or above this subtotal ship free.
fn free_shipping_threshold() -> Decimal {
    Decimal::new(200_00, 2)
}

fn flat_shipping_rate() -> Decimal {
    Decimal::new(15_00, 2)
}

/// Flat 8% tax rate.
fn tax_rate() -> Decimal {
    Decimal::new(8, 2)
}

pub fn shipping_cost(subtotal: Decimal) -> Decimal {
    if subtotal < free_shipping_threshold() {
        flat_shipping_rate()
    } else {
        Decimal::ZERO
    }
}

pub fn tax_for(subtotal: Decimal) -> Decimal {
    (subtotal * tax_rate()).round_dp(2)
}

/// Converts the caller's cart into a persisted order.
///
/// Step order is load-bearing: nothing is written until the cart view has
/// produced at least one line, and the cart is cleared only after the order
/// row is committed. A clear failure at that point leaves stale cart rows
/// behind while the order stands; there is no multi-document transaction
/// here. Two concurrent checkouts of the same cart can both succeed
/// (known race).
pub async fn place_order(
    store: &dyn Store,
    mailer: &Arc<dyn Mailer>,
    user: &User,
    req: OrderCreateRequest,
) -> Result<PlacedOrder, ApiError> {
    let cart_view = cart::services::load_cart(store, user.id).await?;
    if cart_view.items.is_empty() {
        return Err(ApiError::EmptyCart);
    }

    // Snapshot the priced lines; later catalog edits must not reach the order.
    let items: Vec<OrderItem> = cart_view
        .items
        .iter()
        .map(|line| OrderItem {
            product_id: line.product_id,
            product_name: line.name.clone(),
            product_image: line.image.clone(),
            quantity: line.quantity,
            price: line.price,
            selected_size: line.selected_size.clone(),
            selected_color: line.selected_color.clone(),
        })
        .collect();

    // The subtotal is taken from the cart view verbatim, not re-derived.
    let subtotal = cart_view.subtotal;
    let shipping_cost = shipping_cost(subtotal);
    let tax = tax_for(subtotal);
    let total = subtotal + shipping_cost + tax;

    let now = OffsetDateTime::now_utc();
    let shipping_address = req.shipping_address;
    let billing_address = req.billing_address.unwrap_or_else(|| shipping_address.clone());
    let order = Order {
        id: Uuid::new_v4(),
        user_id: user.id,
        items,
        shipping_address,
        billing_address,
        subtotal,
        shipping_cost,
        tax,
        total,
        status: OrderStatus::Pending,
        payment_method: req.payment_method,
        tracking_number: None,
        created_at: now,
        updated_at: now,
    };

    store.insert_order(&order).await?;

    if let Err(err) = store.clear_cart(user.id).await {
        warn!(error = %err, order_id = %order.id, "cart clear failed after order commit; stale entries left behind");
    }

    let mailer = mailer.clone();
    let to = user.email.clone();
    let order_id = order.id;
    email::spawn_send("order confirmation", async move {
        mailer.send_order_confirmation(&to, order_id, total).await
    });

    info!(order_id = %order.id, user_id = %user.id, %total, "order placed");
    Ok(PlacedOrder {
        order_id: order.id,
        total,
    })
}

pub async fn list_orders(store: &dyn Store, user_id: Uuid) -> Result<Vec<Order>, ApiError> {
    Ok(store.list_orders(user_id).await?)
}

pub async fn get_order(store: &dyn Store, user_id: Uuid, id: Uuid) -> Result<Order, ApiError> {
    store
        .find_order(id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))
}

#[cfg(test)]
mod totals_tests {
    use super::*;

    #[test]
    fn shipping_is_free_from_the_threshold_up() {
        assert_eq!(shipping_cost(Decimal::new(199_99, 2)), Decimal::new(15_00, 2));
        // The boundary itself already ships free: 200 is not < 200.
        assert_eq!(shipping_cost(Decimal::new(200_00, 2)), Decimal::ZERO);
        assert_eq!(shipping_cost(Decimal::new(350_00, 2)), Decimal::ZERO);
    }

    #[test]
    fn tax_is_flat_eight_percent() {
        assert_eq!(tax_for(Decimal::new(200_00, 2)), Decimal::new(16_00, 2));
        assert_eq!(tax_for(Decimal::new(50_00, 2)), Decimal::new(4_00, 2));
        assert_eq!(tax_for(Decimal::ZERO), Decimal::ZERO);
    }
}

#[cfg(test)]
mod workflow_tests {
    use super::*;
    use crate::cart::dto::AddCartItemRequest;
    use crate::email::testing::{FailingMailer, RecordingMailer, SentMail};
    use crate::models::{Address, Product, UserProfile};
    use crate::store::mem::MemStore;

    fn product(name: &str, price: i64) -> Product {
        let now = OffsetDateTime::now_utc();
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            price: Decimal::new(price, 2),
            original_price: None,
            category: "sneakers".into(),
            images: vec![format!("{name}.jpg")],
            sizes: vec![],
            colors: vec![],
            materials: vec![],
            stock_quantity: 10,
            featured: false,
            on_sale: false,
            rating: 4.5,
            reviews_count: 0,
            set_size: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn customer() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            email: "buyer@example.com".into(),
            password_hash: "irrelevant".into(),
            is_verified: true,
            verification_code: None,
            verification_expires: None,
            profile: UserProfile::default(),
            addresses: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn address() -> Address {
        Address {
            street: "1 Rue de la Paix".into(),
            city: "Paris".into(),
            state: "IDF".into(),
            zip_code: "75002".into(),
            country: "FR".into(),
            is_default: true,
        }
    }

    fn checkout() -> OrderCreateRequest {
        OrderCreateRequest {
            shipping_address: address(),
            billing_address: None,
            payment_method: "card".into(),
        }
    }

    async fn add(store: &MemStore, user_id: Uuid, product_id: Uuid, quantity: i32) {
        cart::services::add_item(
            store,
            user_id,
            AddCartItemRequest {
                product_id,
                quantity,
                selected_size: None,
                selected_color: None,
            },
        )
        .await
        .unwrap();
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn empty_cart_checkout_fails_and_writes_nothing() {
        let store = MemStore::new();
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let user = customer();

        let err = place_order(&store, &mailer, &user, checkout())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmptyCart));
        assert!(store.list_orders(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_at_free_shipping_boundary() {
        let store = MemStore::new();
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let user = customer();
        let shoe = product("Runner", 100_00);
        let shoe_id = shoe.id;
        store.add_product(shoe).await;
        add(&store, user.id, shoe_id, 2).await;

        // subtotal 200.00: exactly at the threshold, so shipping is free.
        let placed = place_order(&store, &mailer, &user, checkout())
            .await
            .unwrap();
        assert_eq!(placed.total, Decimal::new(216_00, 2));

        let order = get_order(&store, user.id, placed.order_id).await.unwrap();
        assert_eq!(order.subtotal, Decimal::new(200_00, 2));
        assert_eq!(order.shipping_cost, Decimal::ZERO);
        assert_eq!(order.tax, Decimal::new(16_00, 2));
        assert_eq!(order.total, Decimal::new(216_00, 2));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn checkout_below_threshold_pays_shipping() {
        let store = MemStore::new();
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let user = customer();
        let cup = product("Cup", 50_00);
        let cup_id = cup.id;
        store.add_product(cup).await;
        add(&store, user.id, cup_id, 1).await;

        let placed = place_order(&store, &mailer, &user, checkout())
            .await
            .unwrap();
        assert_eq!(placed.total, Decimal::new(69_00, 2));

        let order = get_order(&store, user.id, placed.order_id).await.unwrap();
        assert_eq!(order.subtotal, Decimal::new(50_00, 2));
        assert_eq!(order.shipping_cost, Decimal::new(15_00, 2));
        assert_eq!(order.tax, Decimal::new(4_00, 2));
    }

    #[tokio::test]
    async fn checkout_clears_the_cart_and_sends_confirmation() {
        let store = MemStore::new();
        let recorder = Arc::new(RecordingMailer::default());
        let mailer: Arc<dyn Mailer> = recorder.clone();
        let user = customer();
        let shoe = product("Runner", 100_00);
        let shoe_id = shoe.id;
        store.add_product(shoe).await;
        add(&store, user.id, shoe_id, 1).await;

        let placed = place_order(&store, &mailer, &user, checkout())
            .await
            .unwrap();

        let cart_view = cart::services::load_cart(&store, user.id).await.unwrap();
        assert!(cart_view.items.is_empty());

        settle().await;
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![SentMail::OrderConfirmation {
                to: "buyer@example.com".into(),
                order_id: placed.order_id,
                total: placed.total,
            }]
        );
    }

    #[tokio::test]
    async fn checkout_survives_mail_failure() {
        let store = MemStore::new();
        let mailer: Arc<dyn Mailer> = Arc::new(FailingMailer);
        let user = customer();
        let shoe = product("Runner", 100_00);
        let shoe_id = shoe.id;
        store.add_product(shoe).await;
        add(&store, user.id, shoe_id, 1).await;

        let placed = place_order(&store, &mailer, &user, checkout())
            .await
            .expect("mail failure must not fail checkout");
        settle().await;
        assert!(get_order(&store, user.id, placed.order_id).await.is_ok());
    }

    #[tokio::test]
    async fn order_snapshot_ignores_later_catalog_changes() {
        let store = MemStore::new();
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let user = customer();
        let shoe = product("Runner", 100_00);
        let shoe_id = shoe.id;
        store.add_product(shoe.clone()).await;
        add(&store, user.id, shoe_id, 1).await;

        let placed = place_order(&store, &mailer, &user, checkout())
            .await
            .unwrap();

        // Reprice the catalog entry after the fact.
        let mut repriced = shoe;
        repriced.price = Decimal::new(999_00, 2);
        store.add_product(repriced).await;

        let order = get_order(&store, user.id, placed.order_id).await.unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].price, Decimal::new(100_00, 2));
        assert_eq!(order.items[0].product_name, "Runner");
        assert_eq!(order.items[0].product_image, "Runner.jpg");
    }

    #[tokio::test]
    async fn billing_address_defaults_to_shipping() {
        let store = MemStore::new();
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let user = customer();
        let shoe = product("Runner", 100_00);
        let shoe_id = shoe.id;
        store.add_product(shoe).await;
        add(&store, user.id, shoe_id, 1).await;

        let placed = place_order(&store, &mailer, &user, checkout())
            .await
            .unwrap();
        let order = get_order(&store, user.id, placed.order_id).await.unwrap();
        assert_eq!(order.billing_address.street, order.shipping_address.street);
        assert_eq!(order.billing_address.city, "Paris");
    }

    #[tokio::test]
    async fn orders_are_scoped_to_their_owner() {
        let store = MemStore::new();
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let buyer = customer();
        let stranger = Uuid::new_v4();
        let shoe = product("Runner", 100_00);
        let shoe_id = shoe.id;
        store.add_product(shoe).await;
        add(&store, buyer.id, shoe_id, 1).await;

        let placed = place_order(&store, &mailer, &buyer, checkout())
            .await
            .unwrap();

        let err = get_order(&store, stranger, placed.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(list_orders(&store, stranger).await.unwrap().is_empty());
        assert_eq!(list_orders(&store, buyer.id).await.unwrap().len(), 1);
    }
}
