//! Mock UART implementation for testing

use heapless::Vec;

use crate::platform::{
    error::UartError,
    traits::UartInterface,
    PlatformError, Result,
};

/// Capacity of the captured transmit buffer
pub const MOCK_UART_TX_SIZE: usize = 512;

/// Mock UART implementation
///
/// Captures transmitted bytes in a fixed buffer so tests can verify what
/// went over the wire.
///
/// # Example
///
/// ```
/// use coopsched::platform::mock::MockUart;
/// use coopsched::platform::traits::UartInterface;
///
/// let mut uart = MockUart::new();
/// uart.write(b"report").unwrap();
/// uart.flush().unwrap();
///
/// assert_eq!(uart.tx_bytes(), b"report");
/// assert_eq!(uart.flush_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockUart {
    tx: Vec<u8, MOCK_UART_TX_SIZE>,
    flushes: u32,
}

impl MockUart {
    /// Create a new mock UART with an empty transmit capture
    pub const fn new() -> Self {
        Self {
            tx: Vec::new(),
            flushes: 0,
        }
    }

    /// Get the captured transmit bytes (for test verification)
    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx
    }

    /// Number of times `flush` was called
    pub fn flush_count(&self) -> u32 {
        self.flushes
    }

    /// Clear the transmit capture
    pub fn clear_tx(&mut self) {
        self.tx.clear();
    }
}

impl UartInterface for MockUart {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.tx
            .extend_from_slice(data)
            .map_err(|_| PlatformError::Uart(UartError::Overrun))?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
