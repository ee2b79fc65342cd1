//! Transmitter trait for lighting-protocol outputs

use crate::Result;

/// Trait for DMX payload outputs
///
/// Transmitters wrap whatever library or driver puts payloads on the wire.
/// The engine owns exactly one and drives it through four calls:
///
/// - [`is_available`](Transmitter::is_available) is queried once when the
///   engine is built and cached as a capability flag
/// - [`initialize`](Transmitter::initialize) acquires the output resource
///   before a run starts
/// - [`send`](Transmitter::send) is called once per tick, best-effort
/// - [`shutdown`](Transmitter::shutdown) releases the resource when a run stops
#[async_trait::async_trait]
pub trait Transmitter: Send + 'static {
    /// Whether the backing library/driver is present at all
    fn is_available(&self) -> bool;

    /// Acquire the output resource
    ///
    /// Only called while the transmitter is not initialized.
    async fn initialize(&mut self) -> Result<()>;

    /// Send one payload to `universe`
    ///
    /// Failures are treated as transient by the engine: logged and retried
    /// against current state on the next tick.
    async fn send(&mut self, universe: u16, payload: &[u8]) -> Result<()>;

    /// Release the output resource
    async fn shutdown(&mut self) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: Transmitter + ?Sized> Transmitter for Box<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn initialize(&mut self) -> Result<()> {
        (**self).initialize().await
    }

    async fn send(&mut self, universe: u16, payload: &[u8]) -> Result<()> {
        (**self).send(universe, payload).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown().await
    }
}
