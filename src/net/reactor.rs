//! Single-threaded readiness reactor over `poll(2)`

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::ops::BitOr;
use std::os::fd::{AsFd, BorrowedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::error::{RaopError, Result};

/// Readiness a descriptor is registered for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    /// No readiness
    pub const NONE: Interest = Interest(0);
    /// Readable
    pub const READ: Interest = Interest(1);
    /// Writable
    pub const WRITE: Interest = Interest(2);

    /// Whether every bit of `other` is set
    #[must_use]
    pub fn contains(self, other: Interest) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Whether no bit is set
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Clear the bits of `other`
    #[must_use]
    pub fn without(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }

    fn poll_flags(self) -> PollFlags {
        let mut flags = PollFlags::empty();
        if self.contains(Self::READ) {
            flags |= PollFlags::POLLIN;
        }
        if self.contains(Self::WRITE) {
            flags |= PollFlags::POLLOUT;
        }
        flags
    }

    // Hang-up and error are delivered as readiness so the handler sees the
    // failing read or write.
    fn from_revents(revents: PollFlags) -> Interest {
        let mut ready = Self::NONE;
        if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
            ready = ready | Self::READ;
        }
        if revents.intersects(PollFlags::POLLOUT | PollFlags::POLLERR) {
            ready = ready | Self::WRITE;
        }
        ready
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

/// Callback invoked when a registered descriptor is ready
pub trait EventHandler {
    /// Handle one readiness event
    ///
    /// `ready` is a single interest bit. The handler may change any
    /// registration through `registry`, its own included.
    ///
    /// # Errors
    ///
    /// An error aborts the current tick and is returned from it.
    fn handle_event(&mut self, fd: RawFd, ready: Interest, registry: &mut Registry) -> Result<()>;
}

/// Shared handle to a registered handler
pub type SharedHandler = Rc<RefCell<dyn EventHandler>>;

struct Registration {
    interest: Interest,
    handler: SharedHandler,
}

/// Descriptor table keyed by file descriptor
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<RawFd, Registration>,
}

impl Registry {
    /// Register `fd`, replacing any previous interest and handler
    ///
    /// The descriptor must stay open until it is unregistered.
    pub fn register(&mut self, fd: RawFd, interest: Interest, handler: SharedHandler) {
        tracing::trace!(fd, interest = interest.0, "register");
        self.entries
            .insert(fd, Registration { interest, handler });
    }

    /// Change the interest of a registered descriptor
    ///
    /// Returns `false` if `fd` is not registered.
    pub fn reregister(&mut self, fd: RawFd, interest: Interest) -> bool {
        match self.entries.get_mut(&fd) {
            Some(entry) => {
                tracing::trace!(fd, interest = interest.0, "reregister");
                entry.interest = interest;
                true
            }
            None => false,
        }
    }

    /// Remove a descriptor; returns whether it was registered
    pub fn unregister(&mut self, fd: RawFd) -> bool {
        self.entries.remove(&fd).is_some()
    }

    /// Current interest of `fd`
    #[must_use]
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.entries.get(&fd).map(|e| e.interest)
    }

    /// Whether `fd` is registered
    #[must_use]
    pub fn contains(&self, fd: RawFd) -> bool {
        self.entries.contains_key(&fd)
    }

    /// Number of registered descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registration
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    let ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    PollTimeout::from(ms)
}

/// Waits on every registered descriptor and dispatches ready handlers
#[derive(Default)]
pub struct Reactor {
    registry: Registry,
}

impl Reactor {
    /// Create an empty reactor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered descriptors
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registered descriptors, mutable
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Wait up to `timeout` and dispatch every satisfied interest
    ///
    /// Read is dispatched before write for the same descriptor. A
    /// registration removed or changed by an earlier handler in the same
    /// tick is honored. Returns the number of handler invocations.
    ///
    /// # Errors
    ///
    /// Returns the first handler error, or `RaopError::Reactor` if the wait
    /// itself fails.
    pub fn tick(&mut self, timeout: Duration) -> Result<usize> {
        let armed: Vec<(RawFd, Interest)> = self
            .registry
            .entries
            .iter()
            .filter(|(_, e)| !e.interest.is_empty())
            .map(|(fd, e)| (*fd, e.interest))
            .collect();

        let fired: Vec<(RawFd, Interest)> = {
            let mut fds: Vec<PollFd<'_>> = armed
                .iter()
                .map(|(fd, interest)| {
                    // SAFETY: registered descriptors are kept open by their
                    // owners until unregistered, and `fds` does not outlive
                    // this block.
                    let borrowed = unsafe { BorrowedFd::borrow_raw(*fd) };
                    PollFd::new(borrowed, interest.poll_flags())
                })
                .collect();

            match poll(&mut fds, poll_timeout(timeout)) {
                Ok(0) => return Ok(0),
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(0),
                Err(e) => return Err(RaopError::Reactor(e.to_string())),
            }

            let mut fired = Vec::new();
            for (pfd, (fd, _)) in fds.iter().zip(&armed) {
                let Some(revents) = pfd.revents() else {
                    continue;
                };
                if revents.contains(PollFlags::POLLNVAL) {
                    return Err(RaopError::Reactor(format!("descriptor {fd} is not open")));
                }
                let ready = Interest::from_revents(revents);
                if !ready.is_empty() {
                    fired.push((*fd, ready));
                }
            }
            fired
        };

        let mut dispatched = 0;
        for (fd, ready) in fired {
            for bit in [Interest::READ, Interest::WRITE] {
                if !ready.contains(bit) {
                    continue;
                }
                let Some(entry) = self.registry.entries.get(&fd) else {
                    break;
                };
                if !entry.interest.contains(bit) {
                    continue;
                }
                let handler = Rc::clone(&entry.handler);
                handler
                    .borrow_mut()
                    .handle_event(fd, bit, &mut self.registry)?;
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }
}

/// Non-blocking check whether `fd` has data (or EOF) to read
///
/// # Errors
///
/// Returns the `poll(2)` failure.
pub fn is_readable(fd: impl AsFd) -> io::Result<bool> {
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    loop {
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(0) => return Ok(false),
            Ok(_) => {
                return Ok(fds[0].revents().is_some_and(|r| {
                    r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
                }));
            }
            Err(Errno::EINTR) => {}
            Err(e) => return Err(io::Error::from(e)),
        }
    }
}
