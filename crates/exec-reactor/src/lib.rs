//! Poll reactor façade (spec §4.C).
//!
//! A thin, fd-indexed wrapper over [`mio::Poll`]. Single-threaded and
//! cooperative: `poll_once` runs every ready callback to completion before
//! returning, and no two callbacks ever run concurrently. Callbacks must not
//! block — the only suspension point in the whole executive is inside the
//! kernel wait performed here.

use std::{collections::HashMap, os::fd::RawFd, time::Duration};

use bitflags::bitflags;
use mio::{Events, Interest, Poll, Registry, unix::SourceFd};

pub use mio::Token;

bitflags! {
    /// Interest / readiness mask. `INVAL` mirrors `POLLNVAL`/`POLLHUP`: it is
    /// never something callers register for, only something reported back.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventMask: u8 {
        const READ  = 0b001;
        const WRITE = 0b010;
        const INVAL = 0b100;
    }
}

impl EventMask {
    fn to_interest(self) -> Interest {
        match (self.contains(EventMask::READ), self.contains(EventMask::WRITE)) {
            (_, true) if self.contains(EventMask::READ) => Interest::READABLE | Interest::WRITABLE,
            (true, false) => Interest::READABLE,
            (false, true) => Interest::WRITABLE,
            (false, false) => Interest::READABLE,
        }
    }
}

/// Return value of a reactor callback: keep the fd registered, or drop it.
pub enum Control {
    Continue,
    Remove,
}

/// A single fd's event handler. One instance is installed per [`Reactor::add`]
/// call and lives until `Control::Remove` is returned or `remove` is called
/// explicitly.
///
/// `token` is the handler's own registration, handed back so it can
/// re-arm its own interest (e.g. a connection arming `WRITE` once it has
/// something queued). `spawner` lets an acceptor register a freshly
/// accepted connection without re-entering the reactor.
pub trait Handler {
    fn on_event(&mut self, fd: RawFd, token: Token, mask: EventMask, spawner: &mut Spawner<'_>) -> Control;
}

/// Handle passed to a handler mid-dispatch. New registrations take effect
/// immediately (the registry accepts them); rearming one's own interest
/// does too. Handlers must not try to `add`/`modify`/`remove` anyone
/// else's token — only their own fd is known to be stable at this point.
pub struct Spawner<'a> {
    registry: &'a Registry,
    next_token: &'a mut usize,
    new_slots: &'a mut Vec<(Token, Slot)>,
}

impl<'a> Spawner<'a> {
    /// Register a new fd, returning the token the reactor assigned it.
    /// The handler becomes live on the next `poll_once`.
    pub fn add(&mut self, fd: RawFd, mask: EventMask, handler: Box<dyn Handler>) -> std::io::Result<Token> {
        let token = Token(*self.next_token);
        *self.next_token += 1;
        self.registry.register(&mut SourceFd(&fd), token, mask.to_interest())?;
        self.new_slots.push((token, Slot { fd, handler }));
        Ok(token)
    }

    /// Change the calling handler's own registered interest.
    pub fn reregister_self(&self, fd: RawFd, token: Token, mask: EventMask) -> std::io::Result<()> {
        self.registry.reregister(&mut SourceFd(&fd), token, mask.to_interest())
    }
}

struct Slot {
    fd: RawFd,
    handler: Box<dyn Handler>,
}

/// The reactor itself. Owns every registered fd's handler; `poll_once` is the
/// only place handlers are invoked from.
pub struct Reactor {
    poll: Poll,
    events: Events,
    slots: HashMap<Token, Slot>,
    next_token: usize,
}

impl Reactor {
    pub fn create() -> std::io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(256), slots: HashMap::new(), next_token: 0 })
    }

    /// Register `fd` for `mask` readiness, bound to `handler`. Returns the
    /// token the caller can later use with `modify`/`remove`.
    pub fn add(
        &mut self,
        fd: RawFd,
        mask: EventMask,
        handler: Box<dyn Handler>,
    ) -> std::io::Result<Token> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll.registry().register(&mut SourceFd(&fd), token, mask.to_interest())?;
        self.slots.insert(token, Slot { fd, handler });
        Ok(token)
    }

    /// Change the registered interest for an already-registered fd.
    pub fn modify(&mut self, token: Token, mask: EventMask) -> std::io::Result<()> {
        let Some(slot) = self.slots.get(&token) else { return Ok(()) };
        self.poll.registry().reregister(&mut SourceFd(&slot.fd), token, mask.to_interest())
    }

    /// Deregister and drop the handler for `token`. A no-op if already gone.
    pub fn remove(&mut self, token: Token) -> std::io::Result<()> {
        if let Some(slot) = self.slots.remove(&token) {
            let _ = self.poll.registry().deregister(&mut SourceFd(&slot.fd));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Wait for readiness (or `timeout`) once, dispatching every ready
    /// callback in turn. Handlers that return `Control::Remove` are
    /// deregistered after the dispatch pass completes.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.poll.poll(&mut self.events, timeout)?;

        let mut to_remove = Vec::new();
        let mut new_slots = Vec::new();
        for event in self.events.iter() {
            let token = event.token();
            let mut mask = EventMask::empty();
            if event.is_readable() {
                mask |= EventMask::READ;
            }
            if event.is_writable() {
                mask |= EventMask::WRITE;
            }
            if event.is_error() || (event.is_read_closed() && event.is_write_closed()) {
                mask |= EventMask::INVAL;
            }

            let Some(slot) = self.slots.get_mut(&token) else { continue };
            let fd = slot.fd;
            let mut spawner =
                Spawner { registry: self.poll.registry(), next_token: &mut self.next_token, new_slots: &mut new_slots };
            if matches!(slot.handler.on_event(fd, token, mask, &mut spawner), Control::Remove) {
                to_remove.push(token);
            }
        }

        for (token, slot) in new_slots {
            self.slots.insert(token, slot);
        }
        for token in to_remove {
            self.remove(token)?;
        }
        Ok(())
    }

    /// Run until `should_stop` reports true. Checked once per wait iteration,
    /// so a latched signal flag (§4.J) is observed within one poll timeout.
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool) -> std::io::Result<()> {
        while !should_stop() {
            self.poll_once(Some(Duration::from_millis(100)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        os::{fd::AsRawFd, unix::net::UnixStream},
        sync::{Arc, atomic::{AtomicUsize, Ordering}},
    };

    use super::*;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        remove_after: usize,
    }

    impl Handler for CountingHandler {
        fn on_event(&mut self, _fd: RawFd, _token: Token, _mask: EventMask, _spawner: &mut Spawner<'_>) -> Control {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.remove_after { Control::Remove } else { Control::Continue }
        }
    }

    #[test]
    fn dispatches_readable_and_removes_on_request() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();

        let mut reactor = Reactor::create().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let token = reactor
            .add(
                b.as_raw_fd(),
                EventMask::READ,
                Box::new(CountingHandler { count: count.clone(), remove_after: 1 }),
            )
            .unwrap();

        use std::io::Write;
        let mut a = a;
        a.write_all(b"x").unwrap();

        reactor.poll_once(Some(Duration::from_millis(200))).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(reactor.slots.get(&token).is_none(), "handler should have been removed");
    }

    #[test]
    fn modify_changes_interest_without_losing_handler() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();

        let mut reactor = Reactor::create().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let token = reactor
            .add(
                b.as_raw_fd(),
                EventMask::READ,
                Box::new(CountingHandler { count: count.clone(), remove_after: 100 }),
            )
            .unwrap();

        reactor.modify(token, EventMask::READ | EventMask::WRITE).unwrap();
        assert_eq!(reactor.len(), 1);
    }
}
