//! The multiplexer seam.
//!
//! A multiplexer frames and schedules application data over the tunnels
//! of one session. Its frame format lives elsewhere; the session layer
//! only needs to hand it connections, receive its control events, push
//! token replies through it, and tear it down once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tunnel_protocol::ControlEvent;
use tunnel_transport::Connection;

use crate::TunnelConn;

/// Receives control events from the multiplexer.
///
/// Called on the multiplexer's event-delivery path, so implementations
/// must not block.
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one out-of-band control event.
    fn on_event(&self, event: ControlEvent);
}

/// A server-side multiplexer owned by exactly one session.
pub trait Multiplexer: Send + Sync + 'static {
    /// The physical connection type this multiplexer drives.
    type Conn: Connection;
    /// Why a tunnel stopped being served.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Serves one tunnel until it disconnects or fails.
    ///
    /// Runs the read/write loop and keepalive pings every
    /// `ping_interval`. Control events go to `handler`. May panic on
    /// protocol corruption; callers contain that.
    fn listen(
        &self,
        tun: TunnelConn<Self::Conn>,
        handler: Arc<dyn EventHandler>,
        ping_interval: Duration,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Queues `frame` on the control channel. Delivery is not
    /// guaranteed; `label` names the frame in the multiplexer's logs.
    fn best_send(&self, frame: Vec<u8>, label: &'static str);

    /// Tears down every tunnel and buffer. Invoked once per session.
    fn destroy(&self);
}
