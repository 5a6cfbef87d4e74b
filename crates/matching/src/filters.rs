use crate::error::MatchingError;
use api_client::SymbolFilters;
use rust_decimal::Decimal;

/// Rounds a price to the pair's tick size (nearest tick).
pub fn round_price(filters: &SymbolFilters, price: Decimal) -> Decimal {
    if filters.tick_size.is_zero() {
        return price;
    }
    (price / filters.tick_size).round() * filters.tick_size
}

/// Rounds a quantity down to the pair's step size. Rounding down means we
/// never commit more than the caller asked for.
pub fn round_quantity(filters: &SymbolFilters, quantity: Decimal) -> Decimal {
    if filters.step_size.is_zero() {
        return quantity;
    }
    (quantity / filters.step_size).floor() * filters.step_size
}

/// Validates a rounded price against the venue's min/max bounds.
pub fn check_price_bounds(filters: &SymbolFilters, price: Decimal) -> Result<(), MatchingError> {
    if price < filters.min_price || price > filters.max_price {
        return Err(MatchingError::OutsideFilterBounds {
            field: "price".into(),
            value: price.to_string(),
            min: filters.min_price.to_string(),
            max: filters.max_price.to_string(),
        });
    }
    Ok(())
}

/// Validates a rounded quantity against the venue's min/max bounds.
pub fn check_quantity_bounds(
    filters: &SymbolFilters,
    quantity: Decimal,
) -> Result<(), MatchingError> {
    if quantity < filters.min_qty || quantity > filters.max_qty {
        return Err(MatchingError::OutsideFilterBounds {
            field: "quantity".into(),
            value: quantity.to_string(),
            min: filters.min_qty.to_string(),
            max: filters.max_qty.to_string(),
        });
    }
    Ok(())
}

/// Permissive filters for pairs the venue has not told us about. Used by
/// backtests that run without an exchangeInfo download.
pub fn permissive(symbol: &str) -> SymbolFilters {
    SymbolFilters {
        symbol: symbol.to_string(),
        tick_size: Decimal::ZERO,
        step_size: Decimal::ZERO,
        min_qty: Decimal::ZERO,
        max_qty: Decimal::MAX,
        min_price: Decimal::ZERO,
        max_price: Decimal::MAX,
    }
}
