//! Drives a session from an audio source

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::source::AudioSource;
use crate::client::{PauseState, RaopClient, StreamEvent};
use crate::error::Result;
use crate::protocol::rtsp::{ControlChannel, RtspClient};

/// Cloneable flag asking a running player to stop
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    /// Ask the player to stop at its next step
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// What one player step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStep {
    /// Ticked without sending audio
    Idle,
    /// Sent and fully wrote a frame of this many bytes
    Sent(usize),
    /// The source ran dry; the session is buffer-paused
    Underrun,
    /// The source has data again; the session is playing
    Resumed,
    /// The source ended; waiting for the receiver to drain
    Draining,
    /// The receiver played everything
    Finished,
    /// A stop was requested
    Stopped,
}

/// Main loop feeding a connected client from a source
pub struct StreamPlayer<'a, S: AudioSource, C: ControlChannel = RtspClient> {
    client: &'a mut RaopClient<C>,
    source: S,
    stop: StopHandle,
    source_done: bool,
}

impl<'a, S: AudioSource, C: ControlChannel> StreamPlayer<'a, S, C> {
    /// Play `source` through `client`
    pub fn new(client: &'a mut RaopClient<C>, source: S) -> Self {
        Self {
            client,
            source,
            stop: StopHandle::default(),
            source_done: false,
        }
    }

    /// Handle that stops this player from any thread
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Client being driven
    pub fn client(&mut self) -> &mut RaopClient<C> {
        self.client
    }

    fn tick(&mut self) -> Result<PlayerStep> {
        match self.client.process_events()? {
            Some(StreamEvent::SongDone) if self.source_done => Ok(PlayerStep::Finished),
            _ => Ok(PlayerStep::Idle),
        }
    }

    /// Run one iteration of the main loop
    ///
    /// # Errors
    ///
    /// Returns the first source, session or control failure.
    pub fn step(&mut self) -> Result<PlayerStep> {
        if self.stop.is_stopped() {
            return Ok(PlayerStep::Stopped);
        }

        match self.client.pause_state() {
            PauseState::UserPaused => self.tick(),
            PauseState::BufferPaused => {
                if self.source.poll_available()? {
                    self.client.set_pause(PauseState::Playing)?;
                    Ok(PlayerStep::Resumed)
                } else {
                    self.tick()
                }
            }
            PauseState::Playing if self.source_done => match self.tick()? {
                PlayerStep::Finished => Ok(PlayerStep::Finished),
                _ => Ok(PlayerStep::Draining),
            },
            PauseState::Playing => {
                if !self.source.poll_available()? {
                    tracing::debug!("source underrun");
                    self.client.set_pause(PauseState::BufferPaused)?;
                    return Ok(PlayerStep::Underrun);
                }

                let Some(chunk) = self.source.next_chunk()? else {
                    tracing::info!("source finished, waiting for receiver to drain");
                    self.source_done = true;
                    self.client.set_wait_song_done(true);
                    return Ok(PlayerStep::Draining);
                };

                let sent = self.client.send_sample(&chunk)?;
                while self.client.pending_bytes() > 0 && !self.stop.is_stopped() {
                    self.client.process_events()?;
                }
                Ok(PlayerStep::Sent(sent))
            }
        }
    }

    /// Step until the song finishes or a stop is requested
    ///
    /// # Errors
    ///
    /// Returns the first failure from `step`.
    pub fn run_to_completion(&mut self) -> Result<PlayerStep> {
        loop {
            match self.step()? {
                done @ (PlayerStep::Finished | PlayerStep::Stopped) => return Ok(done),
                _ => {}
            }
        }
    }
}
