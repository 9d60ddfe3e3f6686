/// Errors that can occur on a serial link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link has been closed and accepts no more bytes.
    #[error("link closed")]
    Closed,

    /// The peripheral reported a fault (framing, noise, overrun).
    #[error("link fault: {0}")]
    Fault(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;
