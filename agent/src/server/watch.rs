//! Readiness watch list for one `poll` iteration.

use std::collections::HashSet;
use std::os::fd::RawFd;

use nix::poll::PollFlags;
use serbridge_core::bridge::Bridge;

/// Which endpoint of a bridge a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Listener,
    Uart,
    /// A client, tagged with its connection id.
    Client(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    pub bridge: usize,
    pub role: Role,
    pub fd: RawFd,
    pub events: PollFlags,
}

/// Collect every descriptor to wait on, each at most once.
pub fn build(bridges: &[Bridge]) -> Vec<Watch> {
    let mut seen = HashSet::new();
    let mut watches = Vec::with_capacity(bridges.len() * 3);
    let mut push = |watch: Watch| {
        if seen.insert(watch.fd) {
            watches.push(watch);
        }
    };

    for (index, bridge) in bridges.iter().enumerate() {
        push(Watch {
            bridge: index,
            role: Role::Uart,
            fd: bridge.uart_fd(),
            events: PollFlags::POLLIN,
        });
        push(Watch {
            bridge: index,
            role: Role::Listener,
            fd: bridge.listener_fd(),
            events: PollFlags::POLLIN,
        });
        if let Some((id, fd)) = bridge.client_fd() {
            let mut events = PollFlags::POLLIN;
            if bridge.wants_write() {
                events |= PollFlags::POLLOUT;
            }
            push(Watch {
                bridge: index,
                role: Role::Client(id),
                fd,
                events,
            });
        }
    }
    watches
}

/// Whether `revents` on a descriptor in `role` means the loop itself is
/// broken rather than one connection.
///
/// Client errors and hangups are left to the read path, which turns them
/// into an ordinary disconnect.
pub fn is_fault(role: Role, revents: PollFlags) -> bool {
    if revents.contains(PollFlags::POLLNVAL) {
        return true;
    }
    match role {
        Role::Listener => revents.contains(PollFlags::POLLERR),
        Role::Uart => revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP),
        Role::Client(_) => false,
    }
}

/// Whether a client's `revents` should go through the read path.
pub fn client_readable(revents: PollFlags) -> bool {
    revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
}
