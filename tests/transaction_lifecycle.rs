#![allow(non_snake_case)]
use chrono::{
    Duration,
    Utc,
};
use lottery_client::{
    amount::Amount,
    cache::RemoteValueCache,
    catalog::{
        ActionName,
        Payload,
    },
    derived::Known,
    errors::{
        RejectedAction,
        ValidationError,
    },
    notification::Outcome,
    remote::{
        Address,
        RemoteData,
        RemoteKey,
    },
    test_helpers::{
        FakeRemote,
        RecordedNotification,
        RecordingSink,
    },
    transaction::{
        TransactionController,
        TransactionStatus,
    },
};

type Controller = TransactionController<FakeRemote, FakeRemote, RecordingSink>;

fn player() -> Address {
    Address::new([0xaa; 20])
}

fn operator() -> Address {
    Address::new([0x0f; 20])
}

fn open_draw(remote: &FakeRemote) {
    remote.set_value(
        RemoteKey::TicketUnitPrice,
        RemoteData::Amount(Amount::from_units(100)),
    );
    remote.set_value(
        RemoteKey::CommissionUnitAmount,
        RemoteData::Amount(Amount::from_units(5)),
    );
    remote.set_value(RemoteKey::RemainingTicketCount, RemoteData::Count(10));
    remote.set_value(
        RemoteKey::DrawExpiration,
        RemoteData::Timestamp(Utc::now() + Duration::hours(2)),
    );
    remote.set_value(
        RemoteKey::CurrentPoolAmount,
        RemoteData::Amount(Amount::from_units(0)),
    );
    remote.set_value(RemoteKey::TicketOwnerList, RemoteData::Addresses(vec![]));
    remote.set_value(RemoteKey::OperatorAddress, RemoteData::Address(operator()));
}

async fn connected(remote: &FakeRemote, sink: &RecordingSink, caller: Address) -> Controller {
    let controller = TransactionController::new(
        remote.clone(),
        remote.clone(),
        sink.clone(),
        RemoteValueCache::new(),
        Some(caller),
    );
    controller.refresh_all().await.unwrap();
    controller
}

#[tokio::test]
async fn buy_tickets__refreshes_affected_values_and_updates_derived_state() {
    let remote = FakeRemote::new();
    let sink = RecordingSink::new();
    open_draw(&remote);
    // given
    let controller = connected(&remote, &sink, player()).await;
    remote.on_success(
        "BuyTickets",
        RemoteKey::TicketOwnerList,
        Some(RemoteData::Addresses(vec![player(), operator(), player()])),
    );
    remote.on_success(
        "BuyTickets",
        RemoteKey::RemainingTicketCount,
        Some(RemoteData::Count(7)),
    );
    remote.on_success(
        "BuyTickets",
        RemoteKey::CurrentPoolAmount,
        Some(RemoteData::Amount(Amount::from_units(300))),
    );
    let before = controller.derived_state(2);
    assert_eq!(before.total_cost, Known::Value(Amount::from_units(200)));
    assert_eq!(before.service_fee, Known::Value(Amount::from_units(5)));

    // when
    let settlement = controller
        .execute(ActionName::BuyTickets, Payload::Tickets { quantity: 2 })
        .await
        .unwrap();

    // then
    assert_eq!(settlement.status, TransactionStatus::Succeeded);
    assert_eq!(settlement.refresh_error, None);
    let writes = remote.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "BuyTickets");
    assert_eq!(writes[0].1.value, Some(Amount::from_units(200)));
    assert!(controller.cache().stale_keys().is_empty());
    let after = controller.derived_state(2);
    assert_eq!(after.user_ticket_count, 2);
    assert_eq!(after.is_draw_open_for_purchase, Known::Value(true));
    assert_eq!(
        controller
            .cache()
            .get(RemoteKey::CurrentPoolAmount)
            .and_then(|value| value.value)
            .and_then(|data| data.as_amount()),
        Some(Amount::from_units(300))
    );
    let events = sink.events();
    assert_eq!(events.len(), 2);
    let RecordedNotification::Created { id: created, message } = &events[0] else {
        panic!("expected a pending notification first, got {:?}", events[0]);
    };
    assert_eq!(message, ActionName::BuyTickets.pending_message());
    assert_eq!(
        events[1],
        RecordedNotification::Resolved {
            id: *created,
            outcome: Outcome::Success,
            message: ActionName::BuyTickets.success_message().to_string(),
        }
    );
}

#[tokio::test]
async fn buy_tickets__rejected_write_leaves_cache_fresh_and_unread() {
    let remote = FakeRemote::new();
    let sink = RecordingSink::new();
    open_draw(&remote);
    // given
    let controller = connected(&remote, &sink, player()).await;
    let reads_before = remote.total_reads();
    remote.reject_next_write("insufficient funds");

    // when
    let settlement = controller
        .execute(ActionName::BuyTickets, Payload::Tickets { quantity: 1 })
        .await
        .unwrap();

    // then
    assert_eq!(settlement.status, TransactionStatus::Failed);
    assert_eq!(
        settlement.error.map(|err| err.reason),
        Some(String::from("insufficient funds"))
    );
    assert_eq!(remote.total_reads(), reads_before);
    assert!(controller.cache().stale_keys().is_empty());
    assert!(matches!(
        sink.events().last(),
        Some(RecordedNotification::Resolved {
            outcome: Outcome::Failure,
            ..
        })
    ));
}

#[tokio::test]
async fn buy_tickets__out_of_range_quantity_never_reaches_remote() {
    let remote = FakeRemote::new();
    let sink = RecordingSink::new();
    open_draw(&remote);
    let controller = connected(&remote, &sink, player()).await;

    for quantity in [0, 101] {
        let result = controller
            .execute(ActionName::BuyTickets, Payload::Tickets { quantity })
            .await;

        assert_eq!(
            result.unwrap_err(),
            RejectedAction::Validation(ValidationError::QuantityOutOfRange { quantity })
        );
    }
    assert!(remote.writes().is_empty());
    assert!(sink.events().is_empty());
    assert!(controller.transactions().is_empty());
}

#[tokio::test]
async fn execute__concurrent_actions_settle_independently() {
    let remote = FakeRemote::new();
    let sink = RecordingSink::new();
    open_draw(&remote);
    remote.set_value(
        RemoteKey::WinningsForCaller,
        RemoteData::Amount(Amount::from_units(50)),
    );
    remote.on_success(
        "WithdrawWinnings",
        RemoteKey::WinningsForCaller,
        Some(RemoteData::Amount(Amount::ZERO)),
    );
    // given
    let controller = connected(&remote, &sink, player()).await;
    let gate = remote.hold_writes();

    // when
    let (buy, withdraw, observed_pending) = tokio::join!(
        controller.execute(ActionName::BuyTickets, Payload::Tickets { quantity: 3 }),
        controller.execute(ActionName::WithdrawWinnings, Payload::None),
        async {
            let pending = controller.pending().len();
            gate.release();
            pending
        }
    );

    // then
    assert_eq!(observed_pending, 2);
    let buy = buy.unwrap();
    let withdraw = withdraw.unwrap();
    assert_ne!(buy.id, withdraw.id);
    assert_eq!(buy.status, TransactionStatus::Succeeded);
    assert_eq!(withdraw.status, TransactionStatus::Succeeded);
    let created: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|event| matches!(event, RecordedNotification::Created { .. }))
        .collect();
    assert_eq!(created.len(), 2);
    let derived = controller.derived_state(1);
    assert_eq!(derived.winnings, Known::Value(Amount::ZERO));
    assert_eq!(derived.is_eligible_to_withdraw, Known::Value(false));
    assert!(controller.pending().is_empty());
}

#[tokio::test]
async fn draw_winner__refresh_failure_keeps_affected_key_stale() {
    let remote = FakeRemote::new();
    let sink = RecordingSink::new();
    open_draw(&remote);
    // given
    let controller = connected(&remote, &sink, operator()).await;
    remote.on_success(
        "DrawWinnerTicket",
        RemoteKey::LastWinnerAddress,
        Some(RemoteData::Address(player())),
    );
    remote.on_success(
        "DrawWinnerTicket",
        RemoteKey::LastWinnerAmount,
        Some(RemoteData::Amount(Amount::from_units(900))),
    );
    remote.fail_reads(RemoteKey::CurrentPoolAmount);

    // when
    let settlement = controller
        .execute(ActionName::DrawWinner, Payload::None)
        .await
        .unwrap();

    // then
    assert_eq!(settlement.status, TransactionStatus::Succeeded);
    let refresh_error = settlement.refresh_error.unwrap();
    assert_eq!(
        refresh_error.keys().collect::<Vec<_>>(),
        vec![RemoteKey::CurrentPoolAmount]
    );
    assert!(controller.cache().is_stale(RemoteKey::CurrentPoolAmount));
    assert!(!controller.cache().is_stale(RemoteKey::LastWinnerAddress));
    let winner = controller.derived_state(1).last_winner.unwrap();
    assert_eq!(winner.address, player());
    assert_eq!(winner.amount, Amount::from_units(900));

    // and a later refresh clears the flag once reads recover
    remote.heal_reads(RemoteKey::CurrentPoolAmount);
    controller
        .refresh(&[RemoteKey::CurrentPoolAmount])
        .await
        .unwrap();
    assert!(!controller.cache().is_stale(RemoteKey::CurrentPoolAmount));
}

#[tokio::test]
async fn buy_tickets__affected_keys_stay_stale_until_refresh_resolves() {
    let remote = FakeRemote::new();
    let sink = RecordingSink::new();
    open_draw(&remote);
    // given
    let controller = connected(&remote, &sink, player()).await;
    let reads = remote.hold_reads();

    // when
    let (settlement, stale_while_refreshing) = tokio::join!(
        controller.execute(ActionName::BuyTickets, Payload::Tickets { quantity: 1 }),
        async {
            while remote.writes().is_empty() || controller.cache().stale_keys().is_empty() {
                tokio::task::yield_now().await;
            }
            let stale = controller.cache().stale_keys();
            reads.release();
            stale
        }
    );

    // then
    let mut expected = ActionName::BuyTickets.affected_keys().to_vec();
    expected.sort();
    let mut stale_while_refreshing = stale_while_refreshing;
    stale_while_refreshing.sort();
    assert_eq!(stale_while_refreshing, expected);
    assert_eq!(settlement.unwrap().status, TransactionStatus::Succeeded);
    assert!(controller.cache().stale_keys().is_empty());
}
