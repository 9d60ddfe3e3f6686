use crate::error::Result;

/// Half-duplex, busy-wait serial link.
///
/// Mirrors the UART status flags the firmware polls: the caller spins on
/// [`tx_ready`](SerialLink::tx_ready) before every [`write`](SerialLink::write)
/// and on [`tx_complete`](SerialLink::tx_complete) after the last byte. While
/// spinning it is expected to keep calling [`read`](SerialLink::read) so no
/// inbound byte is lost.
pub trait SerialLink {
    /// Transmit data register is empty and can take another byte.
    fn tx_ready(&mut self) -> bool;

    /// The last byte has fully left the shift register.
    fn tx_complete(&mut self) -> bool;

    /// Queue one byte for transmission. Only valid after `tx_ready()`.
    fn write(&mut self, byte: u8) -> Result<()>;

    /// Take one received byte, if any is pending.
    fn read(&mut self) -> Result<Option<u8>>;
}

impl<T: SerialLink + ?Sized> SerialLink for &mut T {
    fn tx_ready(&mut self) -> bool {
        (**self).tx_ready()
    }

    fn tx_complete(&mut self) -> bool {
        (**self).tx_complete()
    }

    fn write(&mut self, byte: u8) -> Result<()> {
        (**self).write(byte)
    }

    fn read(&mut self) -> Result<Option<u8>> {
        (**self).read()
    }
}
