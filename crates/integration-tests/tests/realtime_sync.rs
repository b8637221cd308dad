//! Cross-session convergence through the change feed.
//!
//! Two cart sessions for the same scope must converge on the same
//! canonical state after every mutation, whichever of them wrote.

use std::sync::Arc;
use std::time::Duration;

use cartwheel_core::{Cart, UserScope};
use cartwheel_integration_tests::{init_tracing, product, scope, seeded_store};
use cartwheel_scan::store::MemoryStore;
use cartwheel_scan::sync::CartSession;
use tokio::sync::watch;

async fn open_session(store: &MemoryStore, user: &UserScope) -> CartSession {
    CartSession::open(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        user.clone(),
    )
    .await
    .expect("session opens")
}

/// Wait until the watched cart satisfies the predicate.
async fn settled(view: &mut watch::Receiver<Cart>, predicate: impl Fn(&Cart) -> bool) -> Cart {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if predicate(&view.borrow()) {
                return view.borrow().clone();
            }
            view.changed().await.expect("publisher alive");
        }
    })
    .await
    .expect("view converges in time")
}

#[tokio::test]
async fn test_write_in_one_session_converges_the_other() {
    init_tracing();
    let apples = product("Apples 1kg", "2.99", "111111");
    let store = seeded_store(&[apples.clone()]);
    let user = scope("user-1");

    let writer = open_session(&store, &user).await;
    let reader = open_session(&store, &user).await;
    let mut reader_view = reader.cart();

    writer
        .service()
        .add_to_cart(apples.id)
        .await
        .expect("add succeeds");

    let cart = settled(&mut reader_view, |c| !c.is_empty()).await;
    assert_eq!(cart.line_for(apples.id).map(|l| l.quantity), Some(1));

    writer.close().await;
    reader.close().await;
}

#[tokio::test]
async fn test_quantity_edit_propagates_both_ways() {
    let apples = product("Apples 1kg", "2.99", "111111");
    let store = seeded_store(&[apples.clone()]);
    let user = scope("user-1");

    let a = open_session(&store, &user).await;
    let b = open_session(&store, &user).await;
    let mut a_view = a.cart();
    let mut b_view = b.cart();

    a.service()
        .add_to_cart(apples.id)
        .await
        .expect("add succeeds");
    let cart = settled(&mut b_view, |c| !c.is_empty()).await;
    let line = cart.line_for(apples.id).expect("line visible in b").clone();

    // B edits the line it learned about through the feed.
    b.service()
        .set_quantity(line.id, 5)
        .await
        .expect("set succeeds");

    let cart = settled(&mut a_view, |c| {
        c.line_for(apples.id).is_some_and(|l| l.quantity == 5)
    })
    .await;
    assert_eq!(cart.total_quantity(), 5);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_remote_clear_supersedes_local_view() {
    let apples = product("Apples 1kg", "2.99", "111111");
    let store = seeded_store(&[apples.clone()]);
    let user = scope("user-1");

    let a = open_session(&store, &user).await;
    let b = open_session(&store, &user).await;
    let mut a_view = a.cart();

    a.service()
        .add_to_cart(apples.id)
        .await
        .expect("add succeeds");
    settled(&mut a_view, |c| !c.is_empty()).await;

    // B clears; A's optimistic view must be replaced wholesale, not merged.
    b.service().clear().await.expect("clear succeeds");
    let cart = settled(&mut a_view, Cart::is_empty).await;
    assert!(cart.is_empty());

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_scopes_are_isolated_on_the_feed() {
    let apples = product("Apples 1kg", "2.99", "111111");
    let store = seeded_store(&[apples.clone()]);

    let alice = open_session(&store, &scope("alice")).await;
    let bob = open_session(&store, &scope("bob")).await;

    alice
        .service()
        .add_to_cart(apples.id)
        .await
        .expect("add succeeds");

    // Give the feed time to (wrongly) deliver before asserting isolation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bob.cart().borrow().is_empty());

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn test_closed_session_no_longer_converges() {
    let apples = product("Apples 1kg", "2.99", "111111");
    let store = seeded_store(&[apples.clone()]);
    let user = scope("user-1");

    let a = open_session(&store, &user).await;
    let b = open_session(&store, &user).await;
    b.close().await;

    a.service()
        .add_to_cart(apples.id)
        .await
        .expect("add succeeds");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // B's subscription is gone; its last published view is frozen.
    assert!(b.cart().borrow().is_empty());

    a.close().await;
}
