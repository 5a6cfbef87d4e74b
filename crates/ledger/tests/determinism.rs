use core_types::{Asset, Pair};
use ledger::{TradeFill, Wallet, WalletSnapshot};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

fn btc_usdt() -> Pair {
    Pair::new("BTC", "USDT")
}

fn fill(quantity: Decimal, price: Decimal, fee: Decimal) -> TradeFill {
    TradeFill {
        pair: btc_usdt(),
        quantity,
        price,
        quote_amount: quantity * price,
        fee,
    }
}

fn run_session(wallet: &mut Wallet) {
    wallet.deposit(dec!(10000), dec!(1)).unwrap();
    wallet.buy(&fill(dec!(0.2), dec!(20000), dec!(4))).unwrap();
    wallet.sell(&fill(dec!(0.1), dec!(22000), dec!(2.2))).unwrap();
    wallet
        .add_position(&btc_usdt(), dec!(0.05), dec!(0))
        .unwrap();
    wallet.withdraw(dec!(500), dec!(0.5)).unwrap();
}

fn prices() -> HashMap<Asset, Decimal> {
    HashMap::from([(Asset::new("BTC"), dec!(21000))])
}

/// Replaying the same operation sequence from scratch must reproduce the
/// exact same derived balances: the ledger has no hidden state outside its
/// transaction log.
#[test]
fn replaying_the_same_operations_reproduces_all_totals() {
    let mut first = Wallet::new(Asset::new("USDT"), dec!(1000), dec!(0.1));
    let mut second = Wallet::new(Asset::new("USDT"), dec!(1000), dec!(0.1));
    run_session(&mut first);
    run_session(&mut second);

    let prices = prices();
    assert_eq!(first.get_spot(), second.get_spot());
    assert_eq!(
        first.get_position(&Asset::new("BTC")),
        second.get_position(&Asset::new("BTC"))
    );
    assert_eq!(first.get_fees(), second.get_fees());
    assert_eq!(
        first.get_total(&prices).unwrap(),
        second.get_total(&prices).unwrap()
    );
    assert_eq!(
        first.get_roi(&prices).unwrap(),
        second.get_roi(&prices).unwrap()
    );
}

/// A snapshot taken mid-session restores to a wallet with identical derived
/// state, and the restored wallet keeps accepting operations consistently.
#[test]
fn snapshot_restore_then_continue_matches_a_continuous_session() {
    let mut continuous = Wallet::new(Asset::new("USDT"), dec!(1000), dec!(0.1));
    run_session(&mut continuous);

    let mut interrupted = Wallet::new(Asset::new("USDT"), dec!(1000), dec!(0.1));
    interrupted.deposit(dec!(10000), dec!(1)).unwrap();
    interrupted
        .buy(&fill(dec!(0.2), dec!(20000), dec!(4)))
        .unwrap();

    let snapshot = WalletSnapshot::capture(&interrupted);
    let json = serde_json::to_string(&snapshot).unwrap();
    let restored_snapshot: WalletSnapshot = serde_json::from_str(&json).unwrap();
    let mut restored = restored_snapshot.restore().unwrap();

    restored
        .sell(&fill(dec!(0.1), dec!(22000), dec!(2.2)))
        .unwrap();
    restored
        .add_position(&btc_usdt(), dec!(0.05), dec!(0))
        .unwrap();
    restored.withdraw(dec!(500), dec!(0.5)).unwrap();

    let prices = prices();
    assert_eq!(continuous.get_spot(), restored.get_spot());
    assert_eq!(
        continuous.get_total(&prices).unwrap(),
        restored.get_total(&prices).unwrap()
    );
    assert_eq!(
        continuous.get_roi(&prices).unwrap(),
        restored.get_roi(&prices).unwrap()
    );
}
