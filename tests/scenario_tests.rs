use chrono::Duration;
use layaway_ledger::domain::layaway::{CollectionType, LayawayRequest, LayawayStatus, SellerInfo};
use layaway_ledger::domain::membership::MembershipStatus;
use layaway_ledger::domain::money::Money;
use layaway_ledger::error::Error;

mod common;

use common::{World, cash};

#[tokio::test]
async fn test_limit_exposure_scenario() {
    let world = World::new();
    let tier = world.tier("Gold", 25_000, 100_000).await;
    let (user, member) = world.member_with(&tier).await;

    let first = world
        .engine
        .create_layaway(&member, user, LayawayRequest::new(Money::new(40_000)))
        .await
        .unwrap();
    world
        .engine
        .activate_layaway(&world.operator, first.id, None)
        .await
        .unwrap();

    let eligibility = world.engine.eligibility(&member, user).await.unwrap();
    assert!(eligibility.has_active_membership);
    assert_eq!(eligibility.layaway_limit, Money::new(100_000));
    assert_eq!(eligibility.current_layaway_total, Money::new(40_000));
    assert_eq!(eligibility.available_layaway, Money::new(60_000));

    let rejected = world
        .engine
        .create_layaway(&member, user, LayawayRequest::new(Money::new(70_000)))
        .await;
    assert!(matches!(rejected, Err(Error::LimitExceeded { .. })));

    let accepted = world
        .engine
        .create_layaway(&member, user, LayawayRequest::new(Money::new(50_000)))
        .await
        .unwrap();
    assert_eq!(accepted.status, LayawayStatus::PendingConfirmation);
}

#[tokio::test]
async fn test_full_payment_scenario() {
    let world = World::new();
    let tier = world.tier("Premium", 20_000, 50_000).await;
    let (user, member) = world.member_with(&tier).await;

    let layaway = world
        .engine
        .create_layaway(&member, user, LayawayRequest::new(Money::new(50_000)))
        .await
        .unwrap();
    assert_eq!(layaway.total, Money::new(55_000));
    world
        .engine
        .confirm_layaway(&world.operator, layaway.id)
        .await
        .unwrap();
    world
        .engine
        .activate_layaway(&world.operator, layaway.id, Some(21))
        .await
        .unwrap();

    let payment = world
        .engine
        .report_payment(&member, layaway.id, Money::new(55_000), Some("MM-55".into()))
        .await
        .unwrap();
    let (_, layaway) = world
        .engine
        .confirm_payment(&world.operator, payment.id)
        .await
        .unwrap();

    assert_eq!(layaway.amount_paid, Money::new(55_000));
    assert_eq!(layaway.status, LayawayStatus::Completed);

    // A completed layaway no longer counts against the limit.
    let eligibility = world.engine.eligibility(&member, user).await.unwrap();
    assert_eq!(eligibility.available_layaway, Money::new(50_000));
}

#[tokio::test]
async fn test_total_holds_across_lifecycle() {
    let world = World::new();
    let tier = world.tier("Gold", 25_000, 200_000).await;
    let (user, member) = world.member_with(&tier).await;

    let request = LayawayRequest {
        item_description: "Chest freezer".to_string(),
        item_value: Money::new(120_000),
        collection_type: CollectionType::Delivery,
        delivery_fee: Money::new(3_000),
        seller: SellerInfo {
            name: "Market stall 12".to_string(),
            phone: "+000 555 0100".to_string(),
            address: "Central market".to_string(),
        },
    };
    let layaway = world.engine.create_layaway(&member, user, request).await.unwrap();
    assert_eq!(layaway.service_fee, Money::new(12_000));
    assert_eq!(layaway.total, Money::new(135_000));

    let id = layaway.id;
    let steps = [
        world.engine.confirm_layaway(&world.operator, id).await.unwrap(),
        world.engine.activate_layaway(&world.operator, id, Some(14)).await.unwrap(),
    ];
    for l in steps {
        let parts = l
            .item_value
            .checked_add(l.service_fee)
            .and_then(|sum| sum.checked_add(l.delivery_fee));
        assert_eq!(Some(l.total), parts);
        assert_eq!(l.seller.name, "Market stall 12");
    }
}

#[tokio::test]
async fn test_cooling_off_boundary() {
    let world = World::new();
    let tier = world.tier("Basic", 10_000, 30_000).await;
    let (user, member) = world.member_with(&tier).await;

    let inside = world
        .engine
        .create_layaway(&member, user, LayawayRequest::new(Money::new(10_000)))
        .await
        .unwrap();
    world.engine.confirm_layaway(&world.operator, inside.id).await.unwrap();
    world.clock.advance(Duration::hours(48));
    let canceled = world.engine.cancel_layaway(&member, inside.id, true).await.unwrap();
    assert_eq!(canceled.cancellation_penalty, Money::ZERO);

    let outside = world
        .engine
        .create_layaway(&member, user, LayawayRequest::new(Money::new(10_000)))
        .await
        .unwrap();
    world.engine.confirm_layaway(&world.operator, outside.id).await.unwrap();
    world
        .engine
        .activate_layaway(&world.operator, outside.id, None)
        .await
        .unwrap();
    world.clock.advance(Duration::hours(48) + Duration::seconds(1));
    let canceled = world.engine.cancel_layaway(&member, outside.id, true).await.unwrap();
    assert_eq!(canceled.cancellation_penalty, Money::new(10_000));
}

#[tokio::test]
async fn test_second_activation_expires_first() {
    let world = World::new();
    let basic = world.tier("Basic", 10_000, 30_000).await;
    let premium = world.tier("Premium", 20_000, 50_000).await;
    let (user, member) = world.member_with(&basic).await;

    world.clock.advance(Duration::days(100));
    let upgrade = world
        .engine
        .create_subscription(&member, user, premium.id, cash(premium.price))
        .await
        .unwrap();
    let activated_at = world.clock.now();
    world
        .engine
        .activate_subscription(&world.operator, upgrade.id)
        .await
        .unwrap();

    let subs = world.engine.list_subscriptions(&member, user).await.unwrap();
    let active: Vec<_> = subs
        .iter()
        .filter(|s| s.status == MembershipStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, upgrade.id);

    let prior = subs.iter().find(|s| s.tier == basic.id).unwrap();
    assert_eq!(prior.status, MembershipStatus::Expired);
    assert_eq!(prior.end_date, Some(activated_at));

    let eligibility = world.engine.eligibility(&member, user).await.unwrap();
    assert_eq!(eligibility.layaway_limit, Money::new(50_000));
}

#[tokio::test]
async fn test_expired_membership_blocks_new_layaways() {
    let world = World::new();
    let tier = world.tier("Basic", 10_000, 30_000).await;
    let (user, member) = world.member_with(&tier).await;

    world.clock.advance(Duration::days(366));
    let report = world.engine.expire_due_memberships().await.unwrap();
    assert_eq!(report.transitioned, 1);

    let result = world
        .engine
        .create_layaway(&member, user, LayawayRequest::new(Money::new(1_000)))
        .await;
    assert!(matches!(result, Err(Error::NotEligible(_))));
    let history = world.engine.list_history(&member, user).await.unwrap();
    assert_eq!(history.len(), 1);
}
