use crate::ui;
use chrono::{
    DateTime,
    Duration as TimeDelta,
    Utc,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use futures::{
    FutureExt,
    StreamExt,
    future::LocalBoxFuture,
    stream::FuturesUnordered,
};
use lottery_client::{
    amount::{
        Amount,
        TicketQuantity,
    },
    cache::RemoteValueCache,
    catalog::{
        self,
        ActionName,
        Payload,
    },
    config::{
        AppConfig,
        DisplayConfig,
    },
    deployment::DeploymentEnv,
    derived::{
        DerivedInputs,
        DerivedState,
        derive,
    },
    errors::{
        RejectedAction,
        RemoteReadError,
    },
    gateway::HttpGateway,
    notification::{
        Notification,
        NotificationCenter,
    },
    remote::{
        Address,
        RemoteKey,
        RemoteReader,
        RemoteWriter,
    },
    transaction::{
        Settlement,
        TransactionController,
        TransactionStatus,
    },
};
use std::{
    collections::BTreeSet,
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    self,
    MissedTickBehavior,
};
use tracing::{
    error,
    info,
    warn,
};

const MAX_ERRORS: usize = 50;
const REDRAW_INTERVAL: Duration = Duration::from_millis(500);
const MAX_TYPED_QUANTITY: u32 = 999;

/// How long a resolved toast stays on screen.
fn toast_linger() -> TimeDelta {
    TimeDelta::seconds(4)
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network: DeploymentEnv,
    pub contract: Address,
    pub caller: Option<Address>,
    pub display: DisplayConfig,
    pub now: DateTime<Utc>,
    pub selected_quantity: u32,
    pub derived: DerivedState,
    pub pool: Option<Amount>,
    pub remaining_tickets: Option<u64>,
    pub ticket_price: Option<Amount>,
    pub expiration: Option<DateTime<Utc>>,
    pub operator_commission: Option<Amount>,
    pub loading: bool,
    pub can_buy: bool,
    pub pending_actions: Vec<ActionName>,
    pub notifications: Vec<Notification>,
    pub status: String,
    pub errors: Vec<String>,
}

impl AppSnapshot {
    pub fn format_amount(&self, amount: Amount) -> String {
        format!(
            "{} {}",
            amount.to_decimal_string(self.display.decimals),
            self.display.currency
        )
    }
}

/// Completed background work, fed back into the controller by the app loop.
pub enum Work {
    Settled {
        action: ActionName,
        result: Result<Settlement, RejectedAction>,
    },
    Refreshed(Result<(), RemoteReadError>),
}

pub struct AppController<R, W> {
    transactions: Arc<TransactionController<R, W, NotificationCenter>>,
    notifications: NotificationCenter,
    network: DeploymentEnv,
    contract: Address,
    display: DisplayConfig,
    pub selected_quantity: u32,
    pub status: String,
    errors: Vec<String>,
    refresh_in_flight: bool,
    /// Actions handed to the loop and not yet settled. Reserved before the
    /// execution is first polled, so a repeated key press cannot slip through.
    in_flight: BTreeSet<ActionName>,
}

impl<R, W> AppController<R, W>
where
    R: RemoteReader + 'static,
    W: RemoteWriter + 'static,
{
    pub fn new(reader: R, writer: W, config: &AppConfig) -> Self {
        let notifications = NotificationCenter::new();
        let transactions = TransactionController::new(
            reader,
            writer,
            notifications.clone(),
            RemoteValueCache::new(),
            config.caller,
        );
        Self {
            transactions: Arc::new(transactions),
            notifications,
            network: config.network,
            contract: config.contract,
            display: config.display.clone(),
            selected_quantity: TicketQuantity::MIN,
            status: String::from("Loading..."),
            errors: Vec::new(),
            refresh_in_flight: false,
            in_flight: BTreeSet::new(),
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub fn inc_quantity(&mut self) {
        self.selected_quantity = self
            .selected_quantity
            .saturating_add(1)
            .clamp(TicketQuantity::MIN, TicketQuantity::MAX);
    }

    pub fn dec_quantity(&mut self) {
        self.selected_quantity = self
            .selected_quantity
            .saturating_sub(1)
            .clamp(TicketQuantity::MIN, TicketQuantity::MAX);
    }

    pub fn type_digit(&mut self, digit: u32) {
        let typed = self.selected_quantity.saturating_mul(10).saturating_add(digit);
        self.selected_quantity = typed.min(MAX_TYPED_QUANTITY);
    }

    pub fn erase_digit(&mut self) {
        self.selected_quantity /= 10;
    }

    /// Background refresh of every key, unless one is already running.
    pub fn refresh_work(&mut self) -> Option<LocalBoxFuture<'static, Work>> {
        if self.refresh_in_flight {
            return None;
        }
        self.refresh_in_flight = true;
        let transactions = Arc::clone(&self.transactions);
        Some(async move { Work::Refreshed(transactions.refresh_all().await) }.boxed_local())
    }

    /// Gates `action` the way the screen does and, if allowed, returns the
    /// execution to drive. Refused requests only update the status line.
    pub fn request(&mut self, action: ActionName) -> Option<LocalBoxFuture<'static, Work>> {
        if self.in_flight.contains(&action) || self.transactions.is_pending(action) {
            self.set_status(format!("{action} is already in progress"));
            return None;
        }
        let snapshot = self.transactions.cache().snapshot();
        let caller = self.transactions.caller();
        if let Err(err) = catalog::authorize(action, caller.as_ref(), &snapshot) {
            self.set_status(format!("Not allowed: {err}"));
            self.push_errors(vec![err.to_string()]);
            return None;
        }

        let payload = match action {
            ActionName::BuyTickets => {
                let derived = self.transactions.derived_state(self.selected_quantity);
                if !derived.is_draw_open_for_purchase.is_true() {
                    self.set_status("The draw is not open for purchases");
                    return None;
                }
                Payload::Tickets {
                    quantity: self.selected_quantity,
                }
            }
            _ => Payload::None,
        };

        info!(%action, "dispatching action");
        self.in_flight.insert(action);
        let transactions = Arc::clone(&self.transactions);
        Some(
            async move {
                Work::Settled {
                    action,
                    result: transactions.execute(action, payload).await,
                }
            }
            .boxed_local(),
        )
    }

    pub fn on_work(&mut self, work: Work) {
        match work {
            Work::Refreshed(result) => {
                self.refresh_in_flight = false;
                match result {
                    Ok(()) => {
                        if self.status == "Loading..." {
                            self.set_status("Ready");
                        }
                    }
                    // read failures only show as values still loading
                    Err(err) => warn!(error = %err, "background refresh incomplete"),
                }
            }
            Work::Settled { action, result } => {
                self.in_flight.remove(&action);
                self.on_settled(result);
            }
        }
    }

    fn on_settled(&mut self, result: Result<Settlement, RejectedAction>) {
        match result {
            Ok(settlement) => {
                let message = match settlement.status {
                    TransactionStatus::Succeeded => settlement.action.success_message(),
                    _ => settlement.action.failure_message(),
                };
                self.set_status(message);
                if let Some(err) = &settlement.error {
                    self.push_errors(vec![format!("{}: {}", settlement.action, err)]);
                }
                // the toast carries the outcome from here on
                self.transactions.acknowledge(settlement.id);
            }
            Err(rejected) => {
                self.set_status(format!("Not sent: {rejected}"));
                self.push_errors(vec![rejected.to_string()]);
            }
        }
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let now = Utc::now();
        let cache = self.transactions.cache().snapshot();
        let derived = derive(
            &cache,
            &DerivedInputs {
                selected_quantity: self.selected_quantity,
                caller: self.transactions.caller(),
                now,
            },
        );
        let amount = |key| cache.data(key).and_then(|data| data.as_amount());
        let pending_actions: Vec<ActionName> = self
            .transactions
            .pending()
            .into_iter()
            .map(|transaction| transaction.action)
            .chain(self.in_flight.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let can_buy = self.transactions.caller().is_some()
            && derived.is_draw_open_for_purchase.is_true()
            && derived.quantity_error.is_none()
            && derived.total_cost.is_known()
            && !pending_actions.contains(&ActionName::BuyTickets);

        AppSnapshot {
            network: self.network,
            contract: self.contract,
            caller: self.transactions.caller(),
            display: self.display.clone(),
            now,
            selected_quantity: self.selected_quantity,
            pool: amount(RemoteKey::CurrentPoolAmount),
            remaining_tickets: cache
                .data(RemoteKey::RemainingTicketCount)
                .and_then(|data| data.as_count()),
            ticket_price: amount(RemoteKey::TicketUnitPrice),
            expiration: cache
                .data(RemoteKey::DrawExpiration)
                .and_then(|data| data.as_timestamp()),
            operator_commission: amount(RemoteKey::OperatorTotalCommission),
            loading: cache.is_loading(self.transactions.caller().as_ref()),
            can_buy,
            derived,
            pending_actions,
            notifications: self.notifications.visible(now, toast_linger()),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    fn prune_notifications(&self) {
        self.notifications.prune(Utc::now(), toast_linger());
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let gateway = HttpGateway::new(&config.gateway_url, config.contract)
        .wrap_err("failed to build gateway client")?;
    info!(
        network = %config.network,
        gateway = gateway.base_url(),
        contract = %config.contract,
        "connecting to lottery contract"
    );
    let controller = AppController::new(gateway.clone(), gateway, &config);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    tracing::info!("UI ready");
    let res = run_loop(controller, config.poll_interval, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<R, W>(
    mut controller: AppController<R, W>,
    poll_interval: Duration,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()>
where
    R: RemoteReader + 'static,
    W: RemoteWriter + 'static,
{
    tracing::info!("Running app loop");
    let mut work: FuturesUnordered<LocalBoxFuture<'static, Work>> = FuturesUnordered::new();
    let mut poll = time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut redraw = time::interval(REDRAW_INTERVAL);
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if let Some(refresh) = controller.refresh_work() {
                    work.push(refresh);
                }
            }
            _ = redraw.tick() => {
                controller.prune_notifications();
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw on redraw tick failed")?;
            }
            Some(done) = work.next(), if !work.is_empty() => {
                controller.on_work(done);
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw after settlement failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::IncQuantity => controller.inc_quantity(),
                    ui::UserEvent::DecQuantity => controller.dec_quantity(),
                    ui::UserEvent::Digit(digit) => controller.type_digit(digit),
                    ui::UserEvent::Erase => controller.erase_digit(),
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Action(action) => {
                        if let Some(execution) = controller.request(action) {
                            work.push(execution);
                        }
                    }
                }
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw after input failed")?;
            }
        }
    }

    if !work.is_empty() {
        warn!(
            outstanding = work.len(),
            "exiting with actions still pending; their outcome is decided on-chain"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use lottery_client::{
        notification::{
            NotificationState,
            Outcome,
        },
        remote::RemoteData,
        test_helpers::FakeRemote,
    };
    use std::path::PathBuf;

    fn me() -> Address {
        Address::new([1; 20])
    }

    fn operator() -> Address {
        Address::new([9; 20])
    }

    fn config(caller: Option<Address>) -> AppConfig {
        AppConfig {
            network: DeploymentEnv::Local,
            gateway_url: String::from("http://localhost"),
            contract: Address::new([7; 20]),
            caller,
            poll_interval: Duration::from_millis(100),
            display: DisplayConfig::default(),
            log_dir: PathBuf::from("/tmp"),
        }
    }

    fn open_draw(remote: &FakeRemote) {
        remote.set_value(
            RemoteKey::TicketUnitPrice,
            RemoteData::Amount(Amount::from_units(10)),
        );
        remote.set_value(RemoteKey::RemainingTicketCount, RemoteData::Count(50));
        remote.set_value(
            RemoteKey::DrawExpiration,
            RemoteData::Timestamp(Utc::now() + TimeDelta::hours(1)),
        );
        remote.set_value(RemoteKey::OperatorAddress, RemoteData::Address(operator()));
        remote.set_value(RemoteKey::TicketOwnerList, RemoteData::Addresses(vec![]));
    }

    async fn refreshed(
        remote: &FakeRemote,
        caller: Option<Address>,
    ) -> AppController<FakeRemote, FakeRemote> {
        let mut controller = AppController::new(remote.clone(), remote.clone(), &config(caller));
        let refresh = controller.refresh_work().unwrap();
        let done = refresh.await;
        controller.on_work(done);
        controller
    }

    #[tokio::test]
    async fn request__buy_tickets_settles_and_updates_toast() {
        // given
        let remote = FakeRemote::new();
        open_draw(&remote);
        remote.on_success(
            "BuyTickets",
            RemoteKey::TicketOwnerList,
            Some(RemoteData::Addresses(vec![me(), me()])),
        );
        let mut controller = refreshed(&remote, Some(me())).await;
        controller.type_digit(2);
        controller.erase_digit();
        controller.inc_quantity();

        // when
        let execution = controller.request(ActionName::BuyTickets).unwrap();
        let done = execution.await;
        controller.on_work(done);

        // then
        let snapshot = controller.build_snapshot();
        assert_eq!(snapshot.status, "Tickets purchased successfully!");
        assert_eq!(snapshot.derived.user_ticket_count, 2);
        assert_eq!(snapshot.notifications.len(), 1);
        assert_eq!(
            snapshot.notifications[0].state,
            NotificationState::Resolved(Outcome::Success)
        );
        assert_eq!(remote.writes()[0].1.value, Some(Amount::from_units(20)));
        assert!(snapshot.pending_actions.is_empty());
    }

    #[tokio::test]
    async fn request__repeated_press_before_first_poll_sends_one_purchase() {
        // given
        let remote = FakeRemote::new();
        open_draw(&remote);
        let mut controller = refreshed(&remote, Some(me())).await;

        // when
        let first = controller.request(ActionName::BuyTickets);
        let second = controller.request(ActionName::BuyTickets);

        // then
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(controller.status, "buy-tickets is already in progress");
        assert_eq!(
            controller.build_snapshot().pending_actions,
            vec![ActionName::BuyTickets]
        );
        let done = first.unwrap().await;
        controller.on_work(done);
        assert_eq!(remote.writes().len(), 1);
        assert!(controller.build_snapshot().pending_actions.is_empty());
        assert!(controller.request(ActionName::BuyTickets).is_some());
    }

    #[tokio::test]
    async fn request__admin_action_refused_for_non_operator() {
        let remote = FakeRemote::new();
        open_draw(&remote);
        let mut controller = refreshed(&remote, Some(me())).await;

        let execution = controller.request(ActionName::DrawWinner);

        assert!(execution.is_none());
        assert!(remote.writes().is_empty());
        assert!(controller.build_snapshot().notifications.is_empty());
        assert!(controller.status.starts_with("Not allowed"));
    }

    #[tokio::test]
    async fn request__buy_refused_while_draw_closed() {
        let remote = FakeRemote::new();
        open_draw(&remote);
        remote.set_value(RemoteKey::RemainingTicketCount, RemoteData::Count(0));
        let mut controller = refreshed(&remote, Some(me())).await;

        assert!(controller.request(ActionName::BuyTickets).is_none());
        assert!(!controller.build_snapshot().can_buy);
        assert!(remote.writes().is_empty());
    }

    #[tokio::test]
    async fn request__out_of_range_quantity_is_rejected_without_toast() {
        let remote = FakeRemote::new();
        open_draw(&remote);
        let mut controller = refreshed(&remote, Some(me())).await;
        controller.erase_digit();

        let done = controller.request(ActionName::BuyTickets).unwrap().await;
        controller.on_work(done);

        let snapshot = controller.build_snapshot();
        assert!(snapshot.status.starts_with("Not sent"));
        assert!(snapshot.notifications.is_empty());
        assert!(remote.writes().is_empty());
    }

    #[tokio::test]
    async fn refresh_work__only_one_background_refresh_at_a_time() {
        let remote = FakeRemote::new();
        let mut controller =
            AppController::new(remote.clone(), remote.clone(), &config(None));

        let first = controller.refresh_work();
        let second = controller.refresh_work();

        assert!(first.is_some());
        assert!(second.is_none());
        controller.on_work(first.unwrap().await);
        assert!(controller.refresh_work().is_some());
    }

    #[test]
    fn quantity_controls__clamp_steps_and_cap_typing() {
        let remote = FakeRemote::new();
        let mut controller =
            AppController::new(remote.clone(), remote.clone(), &config(None));

        controller.dec_quantity();
        assert_eq!(controller.selected_quantity, 1);
        for digit in [5, 0, 0, 0] {
            controller.type_digit(digit);
        }
        assert_eq!(controller.selected_quantity, MAX_TYPED_QUANTITY);
        controller.inc_quantity();
        assert_eq!(controller.selected_quantity, TicketQuantity::MAX);
    }
}
