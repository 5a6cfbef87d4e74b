use crate::error::LedgerError;
use crate::transaction::{Transaction, TransactionKind};
use core_types::{Asset, Pair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

/// The digest of a filled order the wallet needs for bookkeeping.
///
/// The router builds this from a matching-engine or live order response, so
/// the ledger never has to know about the exchange's wire shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFill {
    pub pair: Pair,
    /// Filled quantity in the base asset.
    pub quantity: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Total quote notional of the fill.
    pub quote_amount: Decimal,
    /// Fee charged for the fill, valued in the quote asset. Commissions the
    /// exchange charged in another asset must be converted before the wallet
    /// books them; the router's digest does this at the fill price.
    pub fee: Decimal,
}

/// Category sums derived from the log, recomputed lazily after a mutation.
#[derive(Debug, Clone, Default)]
struct Totals {
    spot: Decimal,
    positions: HashMap<Asset, Decimal>,
    fees: Decimal,
}

/// A trading account's ledger: categorized, append-only transaction
/// collections from which every balance is derived by summation.
///
/// A wallet is created once per account and lives for the account's
/// lifetime; it is only ever replaced by restoring a snapshot. It has no
/// internal synchronization, so embedders must serialize access per account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// The account's cash asset, e.g. USDT.
    quote: Asset,
    max_buy: Decimal,
    buy_rate: Decimal,
    spot: Vec<Transaction>,
    depot: Vec<Transaction>,
    withdrawals: Vec<Transaction>,
    buys: Vec<Transaction>,
    sells: Vec<Transaction>,
    positions: HashMap<Asset, Vec<Transaction>>,
    added_positions: HashMap<Asset, Vec<Transaction>>,
    removed_positions: HashMap<Asset, Vec<Transaction>>,
    #[serde(skip)]
    cache: RefCell<Option<Totals>>,
}

impl Wallet {
    pub fn new(quote: Asset, max_buy: Decimal, buy_rate: Decimal) -> Self {
        Self {
            quote,
            max_buy,
            buy_rate,
            spot: Vec::new(),
            depot: Vec::new(),
            withdrawals: Vec::new(),
            buys: Vec::new(),
            sells: Vec::new(),
            positions: HashMap::new(),
            added_positions: HashMap::new(),
            removed_positions: HashMap::new(),
            cache: RefCell::new(None),
        }
    }

    /// The pair used for cash-only entries (deposits and withdrawals),
    /// where both legs are the account's quote asset.
    fn cash_pair(&self) -> Pair {
        Pair {
            base: self.quote.clone(),
            quote: self.quote.clone(),
        }
    }

    fn invalidate(&self) {
        *self.cache.borrow_mut() = None;
    }

    fn with_totals<R>(&self, f: impl FnOnce(&Totals) -> R) -> R {
        let mut cache = self.cache.borrow_mut();
        if cache.is_none() {
            *cache = Some(self.recompute_totals());
        }
        f(cache.as_ref().expect("cache populated above"))
    }

    fn recompute_totals(&self) -> Totals {
        let spot = self.spot.iter().map(|t| t.right_amount).sum();
        let mut positions = HashMap::new();
        for (asset, entries) in &self.positions {
            let sum: Decimal = entries.iter().map(|t| t.left_amount).sum();
            positions.insert(asset.clone(), sum);
        }
        let fees = self
            .depot
            .iter()
            .chain(&self.withdrawals)
            .chain(&self.buys)
            .chain(&self.sells)
            .chain(self.added_positions.values().flatten())
            .chain(self.removed_positions.values().flatten())
            .map(|t| t.fee)
            .sum();
        Totals {
            spot,
            positions,
            fees,
        }
    }

    fn check_non_negative(name: &str, value: Decimal) -> Result<(), LedgerError> {
        if value.is_sign_negative() {
            return Err(LedgerError::NegativeAmount(format!("{name} = {value}")));
        }
        Ok(())
    }

    /// Credits the spot balance. The fee is recorded but never folded into
    /// the spot amount itself.
    pub fn deposit(&mut self, amount: Decimal, fee: Decimal) -> Result<(), LedgerError> {
        Self::check_non_negative("deposit amount", amount)?;
        Self::check_non_negative("deposit fee", fee)?;

        let entry = Transaction::new(
            TransactionKind::Deposit,
            self.cash_pair(),
            amount,
            Decimal::ZERO,
            fee,
        );
        self.spot.push(entry.derived(amount, Decimal::ZERO));
        self.depot.push(entry);
        self.invalidate();
        Ok(())
    }

    /// Debits the spot balance. Rejected without any transaction being
    /// created when the amount exceeds the current spot balance. As with
    /// every category, the fee is tracked separately and never debited from
    /// spot, so it plays no part in the sufficiency check.
    pub fn withdraw(&mut self, amount: Decimal, fee: Decimal) -> Result<(), LedgerError> {
        Self::check_non_negative("withdrawal amount", amount)?;
        Self::check_non_negative("withdrawal fee", fee)?;
        let spot = self.get_spot();
        if amount > spot {
            return Err(LedgerError::InsufficientSpot {
                required: amount.to_string(),
                available: spot.to_string(),
            });
        }

        let entry = Transaction::new(
            TransactionKind::Withdrawal,
            self.cash_pair(),
            amount,
            Decimal::ZERO,
            fee,
        );
        self.spot.push(entry.derived(-amount, Decimal::ZERO));
        self.withdrawals.push(entry);
        self.invalidate();
        Ok(())
    }

    /// Records a filled buy: one buy-category transaction (quote notional),
    /// one linked position credit (base quantity) and one linked spot debit.
    pub fn buy(&mut self, fill: &TradeFill) -> Result<(), LedgerError> {
        Self::check_non_negative("buy quantity", fill.quantity)?;
        Self::check_non_negative("buy quote amount", fill.quote_amount)?;
        Self::check_non_negative("buy fee", fill.fee)?;
        let spot = self.get_spot();
        if fill.quote_amount > spot {
            return Err(LedgerError::InsufficientSpot {
                required: fill.quote_amount.to_string(),
                available: spot.to_string(),
            });
        }

        let entry = Transaction::new(
            TransactionKind::Buy,
            fill.pair.clone(),
            fill.quote_amount,
            fill.quantity,
            fill.fee,
        );
        self.spot.push(entry.derived(-fill.quote_amount, Decimal::ZERO));
        self.positions
            .entry(fill.pair.base.clone())
            .or_default()
            .push(entry.derived(Decimal::ZERO, fill.quantity));
        self.buys.push(entry);
        self.invalidate();
        tracing::debug!(pair = %fill.pair, qty = %fill.quantity, cost = %fill.quote_amount, "recorded buy");
        Ok(())
    }

    /// Records a filled sell: the mirror of `buy`. Rejected when the sold
    /// quantity exceeds the current position in the base asset.
    pub fn sell(&mut self, fill: &TradeFill) -> Result<(), LedgerError> {
        Self::check_non_negative("sell quantity", fill.quantity)?;
        Self::check_non_negative("sell quote amount", fill.quote_amount)?;
        Self::check_non_negative("sell fee", fill.fee)?;
        let held = self.get_position(&fill.pair.base);
        if fill.quantity > held {
            return Err(LedgerError::InsufficientPosition {
                asset: fill.pair.base.to_string(),
                required: fill.quantity.to_string(),
                available: held.to_string(),
            });
        }

        let entry = Transaction::new(
            TransactionKind::Sell,
            fill.pair.clone(),
            fill.quote_amount,
            fill.quantity,
            fill.fee,
        );
        self.spot.push(entry.derived(fill.quote_amount, Decimal::ZERO));
        self.positions
            .entry(fill.pair.base.clone())
            .or_default()
            .push(entry.derived(Decimal::ZERO, -fill.quantity));
        self.sells.push(entry);
        self.invalidate();
        tracing::debug!(pair = %fill.pair, qty = %fill.quantity, proceeds = %fill.quote_amount, "recorded sell");
        Ok(())
    }

    /// Out-of-band position credit (manual top-up, airdrop). Tracked in its
    /// own category so ROI's invested-capital base can exclude it.
    pub fn add_position(
        &mut self,
        pair: &Pair,
        quantity: Decimal,
        fee: Decimal,
    ) -> Result<(), LedgerError> {
        Self::check_non_negative("added quantity", quantity)?;
        Self::check_non_negative("added fee", fee)?;

        let entry = Transaction::new(
            TransactionKind::Deposit,
            pair.clone(),
            Decimal::ZERO,
            quantity,
            fee,
        );
        self.positions
            .entry(pair.base.clone())
            .or_default()
            .push(entry.derived(Decimal::ZERO, quantity));
        self.added_positions
            .entry(pair.base.clone())
            .or_default()
            .push(entry);
        self.invalidate();
        Ok(())
    }

    /// Out-of-band position debit. Rejected when it would take the position
    /// negative.
    pub fn remove_position(
        &mut self,
        pair: &Pair,
        quantity: Decimal,
        fee: Decimal,
    ) -> Result<(), LedgerError> {
        Self::check_non_negative("removed quantity", quantity)?;
        Self::check_non_negative("removed fee", fee)?;
        let held = self.get_position(&pair.base);
        if quantity > held {
            return Err(LedgerError::InsufficientPosition {
                asset: pair.base.to_string(),
                required: quantity.to_string(),
                available: held.to_string(),
            });
        }

        let entry = Transaction::new(
            TransactionKind::Withdrawal,
            pair.clone(),
            Decimal::ZERO,
            quantity,
            fee,
        );
        self.positions
            .entry(pair.base.clone())
            .or_default()
            .push(entry.derived(Decimal::ZERO, -quantity));
        self.removed_positions
            .entry(pair.base.clone())
            .or_default()
            .push(entry);
        self.invalidate();
        Ok(())
    }

    // --- Read accessors (consumed by report writers; never mutate state) ---

    /// Current spot balance, summed over the spot category.
    pub fn get_spot(&self) -> Decimal {
        self.with_totals(|t| t.spot)
    }

    /// Current position in an asset, summed over its position category.
    pub fn get_position(&self, asset: &Asset) -> Decimal {
        self.with_totals(|t| t.positions.get(asset).copied().unwrap_or(Decimal::ZERO))
    }

    /// Total quote notional spent on buys.
    pub fn get_buy(&self) -> Decimal {
        self.buys.iter().map(|t| t.right_amount).sum()
    }

    /// Total quote notional received from sells.
    pub fn get_sell(&self) -> Decimal {
        self.sells.iter().map(|t| t.right_amount).sum()
    }

    /// Total deposited quote amount.
    pub fn get_deposit(&self) -> Decimal {
        self.depot.iter().map(|t| t.right_amount).sum()
    }

    /// Total withdrawn quote amount.
    pub fn get_withdrawal(&self) -> Decimal {
        self.withdrawals.iter().map(|t| t.right_amount).sum()
    }

    /// All fees ever charged, across every category.
    pub fn get_fees(&self) -> Decimal {
        self.with_totals(|t| t.fees)
    }

    /// Total account value: spot plus every position marked at the supplied
    /// prices (quote per unit of base asset).
    pub fn get_total(&self, prices: &HashMap<Asset, Decimal>) -> Result<Decimal, LedgerError> {
        self.with_totals(|totals| {
            let mut total = totals.spot;
            for (asset, quantity) in &totals.positions {
                if quantity.is_zero() {
                    continue;
                }
                let price = prices
                    .get(asset)
                    .ok_or_else(|| LedgerError::MissingPrice(asset.to_string()))?;
                total += *quantity * *price;
            }
            Ok(total)
        })
    }

    /// Return on invested capital.
    ///
    /// Invested capital is net contributed cash (deposits minus withdrawals).
    /// Out-of-band position adjustments are valued and excluded from the
    /// numerator so airdrops and manual top-ups do not masquerade as trading
    /// performance; fees reduce the return.
    pub fn get_roi(&self, prices: &HashMap<Asset, Decimal>) -> Result<Decimal, LedgerError> {
        let invested = self.get_deposit() - self.get_withdrawal();
        if invested <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let mut out_of_band = Decimal::ZERO;
        for (map, sign) in [
            (&self.added_positions, Decimal::ONE),
            (&self.removed_positions, -Decimal::ONE),
        ] {
            for (asset, entries) in map {
                let quantity: Decimal = entries.iter().map(|t| t.left_amount).sum();
                if quantity.is_zero() {
                    continue;
                }
                let price = prices
                    .get(asset)
                    .ok_or_else(|| LedgerError::MissingPrice(asset.to_string()))?;
                out_of_band += sign * quantity * *price;
            }
        }

        let total = self.get_total(prices)?;
        let performance = total - out_of_band - self.get_fees() - invested;
        Ok(performance / invested)
    }

    /// Spot currently available to commit to a new buy: the most restrictive
    /// of the configured absolute ceiling, the buy-rate fraction of spot, and
    /// the spot balance itself.
    pub fn buy_capital(&self) -> Decimal {
        let spot = self.get_spot();
        let by_rate = spot * self.buy_rate;
        self.max_buy.min(by_rate).min(spot)
    }

    pub fn quote_asset(&self) -> &Asset {
        &self.quote
    }

    /// The full transaction log, flattened across categories, for export and
    /// audit. Order within a category is append order.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.spot
            .iter()
            .chain(&self.depot)
            .chain(&self.withdrawals)
            .chain(&self.buys)
            .chain(&self.sells)
            .chain(self.positions.values().flatten())
            .chain(self.added_positions.values().flatten())
            .chain(self.removed_positions.values().flatten())
    }
}
