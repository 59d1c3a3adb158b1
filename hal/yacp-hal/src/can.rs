//! CAN bus transport abstraction
//!
//! The engine never owns the bus. The transport hands it received frames
//! and sends the replies it produces.

/// Classic CAN data frame payload size
pub const CAN_PAYLOAD_LEN: usize = 8;

/// CAN transport
///
/// Implemented over the chip's CAN controller. Arbitration, mailbox
/// management and retransmission are the implementation's concern.
pub trait CanTransport {
    /// Error type for transmit operations
    type Error;

    /// Configure filters and mailboxes
    ///
    /// Called once before any frame is processed.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Queue a frame for transmission
    fn send(&mut self, id: u32, data: &[u8; CAN_PAYLOAD_LEN]) -> Result<(), Self::Error>;

    /// Take the next received frame, if any
    ///
    /// Must not block: returns `None` when the receive mailboxes are empty.
    fn poll(&mut self) -> Option<(u32, [u8; CAN_PAYLOAD_LEN])>;
}
