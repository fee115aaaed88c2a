use thiserror::Error;

/// Attempted double booking of a room
///
/// Must reach the operator; the store never picks a winner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Room {room} is already occupied by reservation {conflicting_booking_ref}")]
pub struct ConflictError {
    pub room: String,
    pub conflicting_booking_ref: String,
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("Reservation not found: {0}")]
    NotFound(u64),

    #[error("Invalid reservation: {0}")]
    Validation(String),

    #[error("Portal code already in use: {0}")]
    DuplicatePortalCode(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
