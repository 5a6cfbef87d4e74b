use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchingError {
    #[error("Order quantity must be positive, got {0}")]
    InvalidQuantity(String),

    #[error("Invalid order sizing: {0}")]
    InvalidSizing(String),

    #[error("A {0} order requires a limit price")]
    MissingLimitPrice(String),

    #[error("A {0} order requires a stop price")]
    MissingStopPrice(String),

    #[error("{field} {value} is outside the venue bounds [{min}, {max}]")]
    OutsideFilterBounds {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Unknown order id: {0}")]
    UnknownOrder(u64),

    #[error("Order {0} is already terminal and cannot be canceled")]
    AlreadyTerminal(u64),
}
