//! Background sync heartbeat and timing responder
//!
//! Both loops run as tasks on a current-thread tokio runtime hosted by one
//! named OS thread. They share the session clock and stop when the
//! cancellation token fires.

use std::net::UdpSocket as StdUdpSocket;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::framer::StreamClock;
use crate::error::Result;
use crate::protocol::rtp::{NtpTimestamp, SyncPacket, TimingResponse};

/// Name of the thread hosting the timing loops
pub const TIMING_THREAD_NAME: &str = "raop-timing";

/// Period of the sync heartbeat
pub const SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the running timing loops
pub struct TimingSynchronizer {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl TimingSynchronizer {
    /// Start both loops
    ///
    /// `control` and `timing` must already be connected to the receiver's
    /// control and timing ports.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the runtime, the sockets or the thread cannot
    /// be set up.
    pub fn start(
        control: StdUdpSocket,
        timing: StdUdpSocket,
        clock: Arc<StreamClock>,
        interval: Duration,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        control.set_nonblocking(true)?;
        timing.set_nonblocking(true)?;
        let (control, timing) = {
            let _guard = runtime.enter();
            (UdpSocket::from_std(control)?, UdpSocket::from_std(timing)?)
        };

        let cancel = CancellationToken::new();
        let sync_cancel = cancel.clone();
        let responder_cancel = cancel.clone();

        let thread = thread::Builder::new()
            .name(TIMING_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let sync = tokio::spawn(sync_loop(control, clock, interval, sync_cancel));
                    let responder = tokio::spawn(timing_responder(timing, responder_cancel));
                    let (sync, responder) = tokio::join!(sync, responder);
                    if let Err(e) = sync {
                        tracing::warn!("sync loop task failed: {}", e);
                    }
                    if let Err(e) = responder {
                        tracing::warn!("timing responder task failed: {}", e);
                    }
                });
            })?;

        tracing::debug!("timing loops started");
        Ok(Self {
            cancel,
            thread: Some(thread),
        })
    }

    /// Whether the hosting thread is still alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel both loops and join the thread
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("timing thread panicked");
            }
            tracing::debug!("timing loops stopped");
        }
    }
}

impl Drop for TimingSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sync_loop(
    socket: UdpSocket,
    clock: Arc<StreamClock>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let packet = SyncPacket::new(clock.now(), NtpTimestamp::now());
                if let Err(e) = socket.send(&packet.encode()).await {
                    tracing::warn!("sync send failed: {}", e);
                    break;
                }
                tracing::trace!("sync at rtptime {}", packet.rtp_timestamp);
            }
        }
    }
    tracing::debug!("sync loop ended");
}

async fn timing_responder(socket: UdpSocket, cancel: CancellationToken) {
    let mut buf = [0u8; 256];
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            received = socket.recv(&mut buf) => {
                let n = match received {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!("timing read failed: {}", e);
                        break;
                    }
                };
                let Some(response) = TimingResponse::from_request(&buf[..n], NtpTimestamp::now()) else {
                    tracing::trace!("ignoring {} byte timing request", n);
                    continue;
                };
                if let Err(e) = socket.send(&response.encode()).await {
                    tracing::warn!("timing response failed: {}", e);
                    break;
                }
            }
        }
    }
    tracing::debug!("timing responder ended");
}
