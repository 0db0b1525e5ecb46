//! Paper venue
//!
//! In-memory simulated brokerage implementing [`VenueClient`]. Prices follow
//! a seeded random walk; orders fill at the current quote; stops and targets
//! trigger on each simulated bar; every open and close produces a deal so
//! the reconciliation path sees the same history shape as a real venue.

use crate::domain::entities::account::{AccountInfo, Quote, SymbolInfo};
use crate::domain::entities::candle::{Candle, Timeframe};
use crate::domain::entities::deal::{Deal, DealEntry, DealQuery, DealType};
use crate::domain::entities::direction::Direction;
use crate::domain::entities::order::{OrderFill, OrderRequest};
use crate::domain::entities::position::Position;
use crate::domain::errors::{VenueError, REASON_UNSUPPORTED_FILLING};
use crate::domain::repositories::venue_client::{VenueClient, VenueResult};
use crate::domain::value_objects::fill_mode::{FILLING_FOK, FILLING_IOC};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

// Reason codes, numbered like common retail-broker trade servers
pub const RETCODE_INVALID_VOLUME: u32 = 10014;
pub const RETCODE_INVALID_STOPS: u32 = 10016;
pub const RETCODE_TRADE_DISABLED: u32 = 10017;
pub const RETCODE_NO_MONEY: u32 = 10019;
pub const RETCODE_INVALID_FILL: u32 = REASON_UNSUPPORTED_FILLING;
pub const RETCODE_POSITION_CLOSED: u32 = 10036;

/// Simulated instrument
#[derive(Debug, Clone)]
pub struct PaperSymbol {
    pub name: String,
    pub initial_bid: f64,
    pub spread: f64,
    pub digits: u32,
    /// Mask reported in symbol info
    pub filling_modes: u32,
    /// Mask actually enforced on orders, when it differs from the reported one
    pub accepted_filling_modes: Option<u32>,
    pub contract_size: f64,
    /// Standard deviation of one bar's relative move
    pub volatility: f64,
    /// Relative move added to every bar, zero for a driftless walk
    pub drift: f64,
    pub visible: bool,
}

impl PaperSymbol {
    pub fn new(name: &str, initial_bid: f64, spread: f64) -> Self {
        Self {
            name: name.to_string(),
            initial_bid,
            spread,
            digits: 5,
            filling_modes: FILLING_FOK | FILLING_IOC,
            accepted_filling_modes: None,
            contract_size: 100_000.0,
            volatility: 0.002,
            drift: 0.0,
            visible: true,
        }
    }

    pub fn with_digits(mut self, digits: u32) -> Self {
        self.digits = digits;
        self
    }

    pub fn with_filling_modes(mut self, modes: u32) -> Self {
        self.filling_modes = modes;
        self
    }

    pub fn with_accepted_filling_modes(mut self, modes: u32) -> Self {
        self.accepted_filling_modes = Some(modes);
        self
    }

    pub fn with_contract_size(mut self, contract_size: f64) -> Self {
        self.contract_size = contract_size;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_drift(mut self, drift: f64) -> Self {
        self.drift = drift;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PaperVenueConfig {
    pub initial_balance: f64,
    pub leverage: f64,
    /// Charged on every deal, per lot
    pub commission_per_lot: f64,
    pub seed: u64,
    pub timeframe: Timeframe,
    /// Bars generated up front so indicators have history
    pub history_bars: usize,
    pub symbols: Vec<PaperSymbol>,
}

impl PaperVenueConfig {
    pub fn single(symbol: PaperSymbol) -> Self {
        Self {
            symbols: vec![symbol],
            ..Self::default()
        }
    }
}

impl Default for PaperVenueConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            leverage: 100.0,
            commission_per_lot: 3.5,
            seed: 42,
            timeframe: Timeframe::H1,
            history_bars: 400,
            symbols: vec![
                PaperSymbol::new("EURUSD", 1.0850, 0.0001),
                PaperSymbol::new("GBPUSD", 1.2700, 0.00015),
                PaperSymbol::new("USDJPY", 149.50, 0.012).with_digits(3),
                PaperSymbol::new("XAUUSD", 2350.0, 0.30)
                    .with_digits(2)
                    .with_contract_size(100.0)
                    .with_filling_modes(FILLING_IOC),
                PaperSymbol::new("BTCUSD", 65_000.0, 15.0)
                    .with_digits(2)
                    .with_contract_size(1.0)
                    .with_filling_modes(0)
                    .with_volatility(0.006),
            ],
        }
    }
}

#[derive(Debug, Clone)]
struct PaperPosition {
    ticket: u64,
    symbol: String,
    direction: Direction,
    volume: f64,
    entry_price: f64,
    stop_price: Option<f64>,
    target_price: Option<f64>,
    opened_at: DateTime<Utc>,
    owner_tag: u64,
}

#[derive(Debug)]
struct PaperState {
    balance: f64,
    positions: BTreeMap<u64, PaperPosition>,
    deals: Vec<Deal>,
    candles: HashMap<String, Vec<Candle>>,
    quotes: HashMap<String, Quote>,
    next_ticket: u64,
    rng: StdRng,
    offline: bool,
    trading_disabled: bool,
}

impl PaperState {
    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

/// Simulated venue for paper trading and tests
pub struct PaperVenue {
    config: PaperVenueConfig,
    symbols: HashMap<String, PaperSymbol>,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new(config: PaperVenueConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let now = Utc::now();
        let mut candles = HashMap::new();
        let mut quotes = HashMap::new();

        for symbol in &config.symbols {
            let history = generate_history(&mut rng, symbol, config.timeframe, config.history_bars, now);
            let bid = history.last().map(|c| c.close).unwrap_or(symbol.initial_bid);
            quotes.insert(
                symbol.name.clone(),
                Quote {
                    bid,
                    ask: bid + symbol.spread,
                },
            );
            candles.insert(symbol.name.clone(), history);
        }

        let mut state = PaperState {
            balance: config.initial_balance,
            positions: BTreeMap::new(),
            deals: Vec::new(),
            candles,
            quotes,
            next_ticket: 1000,
            rng,
            offline: false,
            trading_disabled: false,
        };

        let deposit_ticket = state.issue_ticket();
        state.deals.push(Deal {
            ticket: deposit_ticket,
            position_id: 0,
            symbol: String::new(),
            deal_type: DealType::Balance,
            entry: DealEntry::In,
            volume: 0.0,
            price: 0.0,
            profit: config.initial_balance,
            commission: 0.0,
            swap: 0.0,
            timestamp: now,
            owner_tag: 0,
        });

        let symbols = config
            .symbols
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();

        Self {
            config,
            symbols,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn online(&self) -> VenueResult<MutexGuard<'_, PaperState>> {
        let state = self.lock();
        if state.offline {
            return Err(VenueError::Unavailable("paper venue offline".to_string()));
        }
        Ok(state)
    }

    fn symbol(&self, name: &str) -> VenueResult<&PaperSymbol> {
        self.symbols
            .get(name)
            .ok_or_else(|| VenueError::UnknownSymbol(name.to_string()))
    }

    /// Simulate one bar on every instrument and fire stops and targets.
    pub fn step(&self) {
        let mut state = self.lock();
        for symbol in self.symbols.values() {
            let Some(last) = state.candles.get(&symbol.name).and_then(|c| c.last()).cloned() else {
                continue;
            };
            let bar = next_bar(&mut state.rng, symbol, &last, self.config.timeframe);
            let bid = bar.close;
            if let Some(series) = state.candles.get_mut(&symbol.name) {
                series.push(bar.clone());
            }
            state.quotes.insert(
                symbol.name.clone(),
                Quote {
                    bid,
                    ask: bid + symbol.spread,
                },
            );
            self.trigger_protection(&mut state, symbol, Some(&bar));
        }
    }

    /// Move an instrument's bid, as if the market traded there.
    pub fn set_price(&self, symbol: &str, bid: f64) -> VenueResult<()> {
        let spec = self.symbol(symbol)?.clone();
        let mut state = self.lock();
        state.quotes.insert(
            spec.name.clone(),
            Quote {
                bid,
                ask: bid + spec.spread,
            },
        );
        if let Some(last) = state.candles.get_mut(symbol).and_then(|c| c.last_mut()) {
            last.close = bid;
            last.high = last.high.max(bid);
            last.low = last.low.min(bid);
        }
        self.trigger_protection(&mut state, &spec, None);
        Ok(())
    }

    /// Close a position at market on behalf of someone else (manual close,
    /// margin call). Returns the closing deal.
    pub fn close_position(&self, ticket: u64) -> VenueResult<Deal> {
        let mut state = self.lock();
        let position = state.positions.get(&ticket).cloned().ok_or(VenueError::Rejected {
            code: RETCODE_POSITION_CLOSED,
            reason: format!("Position {} doesn't exist", ticket),
        })?;
        let spec = self.symbol(&position.symbol)?;
        let quote = current_quote(&state, &position.symbol)?;
        Ok(self.settle(&mut state, spec, &position, exit_price(position.direction, &quote)))
    }

    /// Append an arbitrary deal to the venue history.
    pub fn record_deal(&self, deal: Deal) {
        self.lock().deals.push(deal);
    }

    /// While offline every call fails as a transient error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// While disabled every order and modification is rejected.
    pub fn set_trading_disabled(&self, disabled: bool) {
        self.lock().trading_disabled = disabled;
    }

    pub fn balance(&self) -> f64 {
        self.lock().balance
    }

    fn trigger_protection(&self, state: &mut PaperState, symbol: &PaperSymbol, bar: Option<&Candle>) {
        let Ok(quote) = current_quote(state, &symbol.name) else {
            return;
        };
        let triggered: Vec<(PaperPosition, f64)> = state
            .positions
            .values()
            .filter(|p| p.symbol == symbol.name)
            .filter_map(|p| {
                let exit = exit_price(p.direction, &quote);
                // Worst price the position saw during the bar, on each side
                let (adverse, favorable) = match (bar, p.direction) {
                    (Some(bar), Direction::Long) => (bar.low, bar.high),
                    (Some(bar), Direction::Short) => (bar.high + symbol.spread, bar.low + symbol.spread),
                    (None, _) => (exit, exit),
                };
                if let Some(stop) = p.stop_price {
                    if p.direction.favorable_distance(stop, adverse) <= 0.0 {
                        return Some((p.clone(), stop));
                    }
                }
                if let Some(target) = p.target_price {
                    if p.direction.favorable_distance(target, favorable) >= 0.0 {
                        return Some((p.clone(), target));
                    }
                }
                None
            })
            .collect();

        for (position, price) in triggered {
            let deal = self.settle(state, symbol, &position, price);
            info!(
                ticket = position.ticket,
                symbol = %position.symbol,
                price,
                profit = deal.profit,
                "Paper stop/target triggered"
            );
        }
    }

    fn settle(&self, state: &mut PaperState, symbol: &PaperSymbol, position: &PaperPosition, price: f64) -> Deal {
        let profit = position.direction.favorable_distance(position.entry_price, price)
            * position.volume
            * symbol.contract_size;
        let commission = -self.config.commission_per_lot * position.volume;
        let ticket = state.issue_ticket();
        let deal = Deal {
            ticket,
            position_id: position.ticket,
            symbol: position.symbol.clone(),
            deal_type: deal_type_for(position.direction.opposite()),
            entry: DealEntry::Out,
            volume: position.volume,
            price,
            profit: round_cents(profit),
            commission: round_cents(commission),
            swap: 0.0,
            timestamp: Utc::now(),
            owner_tag: position.owner_tag,
        };
        state.balance += deal.net_profit();
        state.positions.remove(&position.ticket);
        state.deals.push(deal.clone());
        deal
    }

    fn margin_used(&self, state: &PaperState) -> f64 {
        state
            .positions
            .values()
            .filter_map(|p| {
                let spec = self.symbols.get(&p.symbol)?;
                Some(p.volume * spec.contract_size * p.entry_price / self.config.leverage)
            })
            .sum()
    }

    fn floating_profit(&self, state: &PaperState, position: &PaperPosition) -> (f64, f64) {
        let spec = self.symbols.get(&position.symbol);
        let quote = state.quotes.get(&position.symbol);
        match (spec, quote) {
            (Some(spec), Some(quote)) => {
                let current = exit_price(position.direction, quote);
                let profit = position.direction.favorable_distance(position.entry_price, current)
                    * position.volume
                    * spec.contract_size;
                (current, profit)
            }
            _ => (position.entry_price, 0.0),
        }
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    async fn account_info(&self) -> VenueResult<AccountInfo> {
        let state = self.online()?;
        let floating: f64 = state
            .positions
            .values()
            .map(|p| self.floating_profit(&state, p).1)
            .sum();
        let equity = state.balance + floating;
        Ok(AccountInfo {
            balance: state.balance,
            equity,
            free_margin: equity - self.margin_used(&state),
        })
    }

    async fn symbols(&self) -> VenueResult<Vec<SymbolInfo>> {
        let state = self.online()?;
        self.config
            .symbols
            .iter()
            .map(|s| symbol_info(s, current_quote(&state, &s.name)?))
            .collect()
    }

    async fn symbol_info(&self, symbol: &str) -> VenueResult<SymbolInfo> {
        let state = self.online()?;
        let spec = self.symbol(symbol)?;
        symbol_info(spec, current_quote(&state, symbol)?)
    }

    async fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> VenueResult<Vec<Candle>> {
        let state = self.online()?;
        self.symbol(symbol)?;
        if timeframe != self.config.timeframe {
            debug!(
                "Paper venue simulates {:?} bars only, serving them for {:?}",
                self.config.timeframe, timeframe
            );
        }
        let series = state.candles.get(symbol).map(Vec::as_slice).unwrap_or_default();
        Ok(series[series.len().saturating_sub(count)..].to_vec())
    }

    async fn open_positions(&self, owner_tag: Option<u64>) -> VenueResult<Vec<Position>> {
        let state = self.online()?;
        Ok(state
            .positions
            .values()
            .filter(|p| owner_tag.map_or(true, |tag| p.owner_tag == tag))
            .map(|p| {
                let (current_price, unrealized_profit) = self.floating_profit(&state, p);
                Position {
                    ticket: p.ticket,
                    symbol: p.symbol.clone(),
                    direction: p.direction,
                    volume: p.volume,
                    entry_price: p.entry_price,
                    current_price,
                    stop_price: p.stop_price,
                    target_price: p.target_price,
                    opened_at: p.opened_at,
                    unrealized_profit: round_cents(unrealized_profit),
                    owner_tag: p.owner_tag,
                }
            })
            .collect())
    }

    async fn deals(&self, query: &DealQuery) -> VenueResult<Vec<Deal>> {
        let state = self.online()?;
        // History servers refuse ranges starting before the epoch
        if query.from < DateTime::<Utc>::UNIX_EPOCH {
            return Err(VenueError::InvalidRequest(format!(
                "history range starts before epoch: {}",
                query.from
            )));
        }
        Ok(state.deals.iter().filter(|d| query.matches(d)).cloned().collect())
    }

    async fn submit_order(&self, request: &OrderRequest) -> VenueResult<OrderFill> {
        let mut state = self.online()?;
        let spec = self.symbol(&request.symbol)?;
        if state.trading_disabled {
            return Err(VenueError::Rejected {
                code: RETCODE_TRADE_DISABLED,
                reason: "Trade disabled".to_string(),
            });
        }
        let accepted = spec.accepted_filling_modes.unwrap_or(spec.filling_modes);
        if !request.fill_mode.is_supported_by(accepted) {
            return Err(VenueError::Rejected {
                code: RETCODE_INVALID_FILL,
                reason: format!("Unsupported filling mode {}", request.fill_mode),
            });
        }
        if !(request.volume > 0.0) {
            return Err(VenueError::Rejected {
                code: RETCODE_INVALID_VOLUME,
                reason: "Invalid volume".to_string(),
            });
        }

        let quote = current_quote(&state, &request.symbol)?;
        let price = match request.direction {
            Direction::Long => quote.ask,
            Direction::Short => quote.bid,
        };
        let exit = exit_price(request.direction, &quote);
        if request.direction.favorable_distance(request.stop_price, exit) <= 0.0
            || request.direction.favorable_distance(exit, request.target_price) <= 0.0
        {
            return Err(VenueError::Rejected {
                code: RETCODE_INVALID_STOPS,
                reason: "Invalid stops".to_string(),
            });
        }

        let required_margin = request.volume * spec.contract_size * price / self.config.leverage;
        let floating: f64 = state
            .positions
            .values()
            .map(|p| self.floating_profit(&state, p).1)
            .sum();
        let free_margin = state.balance + floating - self.margin_used(&state);
        if required_margin > free_margin {
            return Err(VenueError::Rejected {
                code: RETCODE_NO_MONEY,
                reason: "No money".to_string(),
            });
        }

        let ticket = state.issue_ticket();
        let deal_ticket = state.issue_ticket();
        let now = Utc::now();
        let commission = round_cents(-self.config.commission_per_lot * request.volume);

        state.positions.insert(
            ticket,
            PaperPosition {
                ticket,
                symbol: request.symbol.clone(),
                direction: request.direction,
                volume: request.volume,
                entry_price: price,
                stop_price: Some(request.stop_price),
                target_price: Some(request.target_price),
                opened_at: now,
                owner_tag: request.owner_tag,
            },
        );
        state.deals.push(Deal {
            ticket: deal_ticket,
            position_id: ticket,
            symbol: request.symbol.clone(),
            deal_type: deal_type_for(request.direction),
            entry: DealEntry::In,
            volume: request.volume,
            price,
            profit: 0.0,
            commission,
            swap: 0.0,
            timestamp: now,
            owner_tag: request.owner_tag,
        });
        state.balance += commission;

        Ok(OrderFill {
            ticket,
            deal_ticket,
            price,
            volume: request.volume,
            filled_at: now,
        })
    }

    async fn modify_protection(&self, ticket: u64, stop_price: f64, target_price: Option<f64>) -> VenueResult<()> {
        let mut state = self.online()?;
        if state.trading_disabled {
            return Err(VenueError::Rejected {
                code: RETCODE_TRADE_DISABLED,
                reason: "Trade disabled".to_string(),
            });
        }
        let position = state.positions.get(&ticket).cloned().ok_or(VenueError::Rejected {
            code: RETCODE_POSITION_CLOSED,
            reason: format!("Position {} doesn't exist", ticket),
        })?;
        let quote = current_quote(&state, &position.symbol)?;
        let exit = exit_price(position.direction, &quote);
        let stop_valid = position.direction.favorable_distance(stop_price, exit) > 0.0;
        let target_valid = target_price.map_or(true, |t| position.direction.favorable_distance(exit, t) > 0.0);
        if !stop_valid || !target_valid {
            return Err(VenueError::Rejected {
                code: RETCODE_INVALID_STOPS,
                reason: "Invalid stops".to_string(),
            });
        }

        if let Some(p) = state.positions.get_mut(&ticket) {
            p.stop_price = Some(stop_price);
            p.target_price = target_price;
        }
        Ok(())
    }
}

fn current_quote(state: &PaperState, symbol: &str) -> VenueResult<Quote> {
    state
        .quotes
        .get(symbol)
        .copied()
        .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
}

fn symbol_info(spec: &PaperSymbol, quote: Quote) -> VenueResult<SymbolInfo> {
    Ok(SymbolInfo {
        name: spec.name.clone(),
        visible: spec.visible,
        filling_modes: spec.filling_modes,
        quote,
        digits: spec.digits,
    })
}

/// Price at which a position would close right now.
fn exit_price(direction: Direction, quote: &Quote) -> f64 {
    match direction {
        Direction::Long => quote.bid,
        Direction::Short => quote.ask,
    }
}

fn deal_type_for(direction: Direction) -> DealType {
    match direction {
        Direction::Long => DealType::Buy,
        Direction::Short => DealType::Sell,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn generate_history(
    rng: &mut StdRng,
    symbol: &PaperSymbol,
    timeframe: Timeframe,
    bars: usize,
    now: DateTime<Utc>,
) -> Vec<Candle> {
    let start = now - timeframe.duration() * bars as i32;
    let mut history: Vec<Candle> = Vec::with_capacity(bars);
    let mut previous = Candle {
        time: start,
        open: symbol.initial_bid,
        high: symbol.initial_bid,
        low: symbol.initial_bid,
        close: symbol.initial_bid,
        volume: 0.0,
    };
    for _ in 0..bars {
        let bar = next_bar(rng, symbol, &previous, timeframe);
        history.push(bar.clone());
        previous = bar;
    }
    history
}

fn next_bar(rng: &mut StdRng, symbol: &PaperSymbol, previous: &Candle, timeframe: Timeframe) -> Candle {
    let open = previous.close;
    // Uniform noise scaled to the configured standard deviation
    let shock: f64 = rng.gen_range(-1.0f64..1.0) * symbol.volatility * 3f64.sqrt();
    let close = (open * (1.0 + symbol.drift + shock)).max(open * 0.5);
    let wick_up: f64 = rng.gen_range(0.0f64..1.0) * symbol.volatility * open * 0.5;
    let wick_down: f64 = rng.gen_range(0.0f64..1.0) * symbol.volatility * open * 0.5;
    Candle {
        time: previous.time + timeframe.duration(),
        open,
        high: open.max(close) + wick_up,
        low: (open.min(close) - wick_down).max(f64::MIN_POSITIVE),
        close,
        volume: rng.gen_range(100.0f64..1000.0),
    }
}
