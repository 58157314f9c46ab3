//! UART interface trait
//!
//! This module defines the byte transport used for outbound reports.

use crate::platform::Result;

/// UART transport interface
///
/// Platform implementations must provide this interface for serial output.
pub trait UartInterface {
    /// Write data to the UART
    ///
    /// # Arguments
    ///
    /// * `data` - Bytes to transmit
    ///
    /// # Returns
    ///
    /// Number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Uart` if the write fails.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Block until all buffered bytes have been transmitted
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Uart` if the flush fails.
    fn flush(&mut self) -> Result<()>;
}
