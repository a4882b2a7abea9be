use crate::client::AppSnapshot;
use chrono::{
    DateTime,
    Utc,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use lottery_client::{
    amount::Amount,
    catalog::ActionName,
    derived::Known,
    notification::{
        NotificationState,
        Outcome,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::{
    self,
    stdout,
};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    IncQuantity,
    DecQuantity,
    Digit(u32),
    Erase,
    Action(ActionName),
    Redraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<io::Stdout>>>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    Confirm(ActionName),
    QuitModal,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<io::Result<Event>>;

/// Reads terminal events on a dedicated thread so the app loop never blocks.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let ev = event::read();
            let failed = ev.is_err();
            if tx.send(ev).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(ev) => Ok(ev?),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // one persistent terminal keeps buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    if k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }

    match state.mode {
        Mode::Confirm(action) => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Action(action))
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::QuitModal => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    let confirm = |state: &mut UiState, action: ActionName| {
        state.mode = Mode::Confirm(action);
        Some(UserEvent::Redraw)
    };
    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('+') | KeyCode::Up | KeyCode::Right => Some(UserEvent::IncQuantity),
        KeyCode::Char('-') | KeyCode::Down | KeyCode::Left => Some(UserEvent::DecQuantity),
        KeyCode::Char(c) if c.is_ascii_digit() => c.to_digit(10).map(UserEvent::Digit),
        KeyCode::Backspace => Some(UserEvent::Erase),
        KeyCode::Enter | KeyCode::Char('b') => Some(UserEvent::Action(ActionName::BuyTickets)),
        KeyCode::Char('w') => Some(UserEvent::Action(ActionName::WithdrawWinnings)),
        KeyCode::Char('d') => confirm(state, ActionName::DrawWinner),
        KeyCode::Char('c') => confirm(state, ActionName::WithdrawCommission),
        KeyCode::Char('r') => confirm(state, ActionName::RestartDraw),
        KeyCode::Char('f') => confirm(state, ActionName::RefundAll),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // status
            Constraint::Length(3),  // last winner
            Constraint::Length(9),  // draw + purchase
            Constraint::Length(5),  // tickets
            Constraint::Length(8),  // winnings + admin
            Constraint::Min(4),     // notifications
            Constraint::Length(6),  // errors + help
        ])
        .split(f.area());

    draw_top(f, chunks[0], snap);
    draw_winner_banner(f, chunks[1], snap);
    draw_draw_row(f, chunks[2], snap);
    draw_tickets(f, chunks[3], snap);
    draw_account_row(f, chunks[4], snap);
    draw_notifications(f, chunks[5], snap);
    draw_bottom(f, chunks[6], snap);
    draw_modals(f, state);
}

fn draw_top(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let wallet = snap
        .caller
        .map(|caller| caller.short())
        .unwrap_or_else(|| String::from("not connected"));
    let loading = if snap.loading { " | loading..." } else { "" };
    let top = Paragraph::new(format!(
        "{} | Contract: {} | Wallet: {}{} | {}",
        snap.network,
        snap.contract.short(),
        wallet,
        loading,
        snap.status
    ))
    .block(Block::default().borders(Borders::ALL).title("Lottery"));
    f.render_widget(top, area);
}

fn draw_winner_banner(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let line = match &snap.derived.last_winner {
        Some(winner) => Line::from(vec![
            Span::raw("Last winner: "),
            Span::styled(
                winner.address.short(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(" won {}", snap.format_amount(winner.amount))),
        ]),
        None => Line::styled("No winner yet", Style::default().fg(Color::DarkGray)),
    };
    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn draw_draw_row(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let open = match snap.derived.is_draw_open_for_purchase {
        Known::Value(true) => Span::styled("OPEN", Style::default().fg(Color::Green)),
        Known::Value(false) => Span::styled("CLOSED", Style::default().fg(Color::Red)),
        Known::Unknown => Span::styled("...", Style::default().fg(Color::DarkGray)),
    };
    let draw_lines = vec![
        Line::from(vec![Span::raw("Status: "), open]),
        Line::from(format!("Pool: {}", opt_amount(snap, snap.pool))),
        Line::from(format!(
            "Tickets remaining: {}",
            snap.remaining_tickets
                .map(|n| n.to_string())
                .unwrap_or_else(loading_text)
        )),
        Line::from(format!("Ticket price: {}", opt_amount(snap, snap.ticket_price))),
        Line::from(format!(
            "Closes in: {}",
            snap.expiration
                .map(|at| countdown(at, snap.now))
                .unwrap_or_else(loading_text)
        )),
    ];
    f.render_widget(
        Paragraph::new(draw_lines).block(Block::default().borders(Borders::ALL).title("Current Draw")),
        cols[0],
    );

    let mut buy_lines = vec![
        Line::from(format!("Quantity: {}  (+/- or type)", snap.selected_quantity)),
        Line::from(format!("Total cost: {}", known_amount(snap, &snap.derived.total_cost))),
        Line::from(format!("Service fee per ticket: {}", known_amount(snap, &snap.derived.service_fee))),
    ];
    if let Some(err) = &snap.derived.quantity_error {
        buy_lines.push(Line::styled(err.to_string(), Style::default().fg(Color::Red)));
    }
    let buy = if snap.pending_actions.contains(&ActionName::BuyTickets) {
        Span::styled("[b] Buying...", Style::default().fg(Color::Yellow))
    } else if snap.can_buy {
        Span::styled(
            "[b] Buy tickets",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("[b] Buy tickets", Style::default().fg(Color::DarkGray))
    };
    buy_lines.push(Line::from(buy));
    f.render_widget(
        Paragraph::new(buy_lines).block(Block::default().borders(Borders::ALL).title("Buy")),
        cols[1],
    );
}

fn draw_tickets(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let count = snap.derived.user_ticket_count;
    let line = if snap.caller.is_none() {
        Line::styled("Connect a wallet to see your tickets", Style::default().fg(Color::DarkGray))
    } else if count == 0 {
        Line::styled("You have no tickets in this draw", Style::default().fg(Color::DarkGray))
    } else {
        let tiles: Vec<Span> = (1..=count)
            .map(|n| Span::styled(format!("[#{n}] "), Style::default().fg(Color::Cyan)))
            .collect();
        Line::from(tiles)
    };
    let title = format!("Your Tickets ({count})");
    f.render_widget(
        Paragraph::new(line)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

fn draw_account_row(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let mut winnings = vec![Line::from(format!(
        "Winnings: {}",
        known_amount(snap, &snap.derived.winnings)
    ))];
    if snap.derived.is_eligible_to_withdraw.is_true() {
        winnings.push(Line::styled(
            "You won! Press [w] to withdraw",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ));
    }
    if snap.pending_actions.contains(&ActionName::WithdrawWinnings) {
        winnings.push(Line::styled("Withdrawing...", Style::default().fg(Color::Yellow)));
    }
    f.render_widget(
        Paragraph::new(winnings).block(Block::default().borders(Borders::ALL).title("Winnings")),
        cols[0],
    );

    let admin = if snap.derived.is_operator.is_true() {
        let mut lines = vec![Line::from(format!(
            "Commission: {}",
            opt_amount(snap, snap.operator_commission)
        ))];
        for (key, action) in [
            ('d', ActionName::DrawWinner),
            ('c', ActionName::WithdrawCommission),
            ('r', ActionName::RestartDraw),
            ('f', ActionName::RefundAll),
        ] {
            let pending = if snap.pending_actions.contains(&action) {
                " (pending)"
            } else {
                ""
            };
            lines.push(Line::from(format!("[{key}] {action}{pending}")));
        }
        lines
    } else {
        vec![Line::styled("Operator controls hidden", Style::default().fg(Color::DarkGray))]
    };
    f.render_widget(
        Paragraph::new(admin).block(Block::default().borders(Borders::ALL).title("Admin")),
        cols[1],
    );
}

fn draw_notifications(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines: Vec<Line> = Vec::new();
    for toast in snap.notifications.iter().rev() {
        let style = match toast.state {
            NotificationState::Pending => Style::default().fg(Color::Yellow),
            NotificationState::Resolved(Outcome::Success) => Style::default().fg(Color::Green),
            NotificationState::Resolved(Outcome::Failure) => Style::default().fg(Color::Red),
        };
        lines.push(Line::styled(toast.message.clone(), style));
    }
    if lines.is_empty() {
        lines.push(Line::styled("Nothing in flight", Style::default().fg(Color::DarkGray)));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Notifications")),
        area,
    );
}

fn draw_bottom(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3)])
        .split(area);

    let (text, color) = match snap.errors.last() {
        Some(last) => (last.clone(), Color::Red),
        None => (String::from("No errors"), Color::DarkGray),
    };
    let errors = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Errors"));
    f.render_widget(errors, chunks[0]);

    let help = Paragraph::new(
        "+/- or digits quantity | b/Enter buy | w withdraw | d draw | c commission | r restart | f refund | q/Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    let (title, body) = match state.mode {
        Mode::Normal => return,
        Mode::Confirm(action) => (
            format!("Confirm {action}"),
            format!("Send {action} to the contract?\ny/Enter=confirm n/Esc=cancel"),
        ),
        Mode::QuitModal => (
            String::from("Quit"),
            String::from("Quit the lottery client?\ny=quit n/Esc=stay"),
        ),
    };
    let area = centered_rect(40, 20, f.area());
    let block = Block::default().borders(Borders::ALL).title(title);
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(Paragraph::new(body), block.inner(area));
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn loading_text() -> String {
    String::from("...")
}

fn opt_amount(snap: &AppSnapshot, amount: Option<Amount>) -> String {
    amount
        .map(|amount| snap.format_amount(amount))
        .unwrap_or_else(loading_text)
}

fn known_amount(snap: &AppSnapshot, amount: &Known<Amount>) -> String {
    opt_amount(snap, amount.value().copied())
}

fn countdown(expiration: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let left = expiration.signed_duration_since(now);
    if left.num_seconds() <= 0 {
        return String::from("expired");
    }
    let secs = left.num_seconds();
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let (hours, minutes, seconds) = (rest / 3_600, rest % 3_600 / 60, rest % 60);
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
