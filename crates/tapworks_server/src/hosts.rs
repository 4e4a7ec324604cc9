//! # Room-to-Host Directory
//!
//! Decides which server process owns a room. A room is assigned once, to
//! the host with the fewest members at that moment (ties go to the smaller
//! host name), and keeps that host afterwards.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::error::{ServerError, ServerResult};

/// Shared room-to-host assignment.
pub trait HostDirectory: Send + Sync {
    /// Host owning `room`, assigning one if needed.
    ///
    /// # Errors
    ///
    /// Backend failure, or no host to assign.
    fn host_for_room(&self, room: &str) -> ServerResult<String>;

    /// Counts a new member on the room's host.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn add_member(&self, room: &str) -> ServerResult<()>;

    /// Uncounts a member from the room's host.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn leave_member(&self, room: &str) -> ServerResult<()>;

    /// Zeroes every configured host's member counter.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn reset(&self) -> ServerResult<()>;
}

#[derive(Debug, Default)]
struct Directory {
    room_host: HashMap<String, String>,
    member_count: BTreeMap<String, u64>,
}

/// In-process [`HostDirectory`].
#[derive(Debug)]
pub struct LocalHostDirectory {
    hosts: Vec<String>,
    inner: Mutex<Directory>,
}

impl LocalHostDirectory {
    /// Creates a directory over `hosts`, all counters at zero.
    #[must_use]
    pub fn new(hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
        let member_count = hosts.iter().map(|h| (h.clone(), 0)).collect();
        Self { hosts, inner: Mutex::new(Directory { room_host: HashMap::new(), member_count }) }
    }

    /// Members currently counted on `host`.
    #[must_use]
    pub fn member_count(&self, host: &str) -> u64 {
        self.inner.lock().member_count.get(host).copied().unwrap_or(0)
    }

    fn assign(directory: &mut Directory, room: &str) -> ServerResult<String> {
        if let Some(host) = directory.room_host.get(room) {
            return Ok(host.clone());
        }
        let host = directory
            .member_count
            .iter()
            .min_by(|(a_name, a), (b_name, b)| a.cmp(b).then_with(|| a_name.cmp(b_name)))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| ServerError::Config("no hosts to assign rooms to".into()))?;
        directory.room_host.insert(room.to_string(), host.clone());
        tracing::info!(room, host = %host, "room assigned");
        Ok(host)
    }
}

impl HostDirectory for LocalHostDirectory {
    fn host_for_room(&self, room: &str) -> ServerResult<String> {
        Self::assign(&mut self.inner.lock(), room)
    }

    fn add_member(&self, room: &str) -> ServerResult<()> {
        let mut directory = self.inner.lock();
        let host = Self::assign(&mut directory, room)?;
        *directory.member_count.entry(host).or_default() += 1;
        Ok(())
    }

    fn leave_member(&self, room: &str) -> ServerResult<()> {
        let mut directory = self.inner.lock();
        let host = Self::assign(&mut directory, room)?;
        let count = directory.member_count.entry(host).or_default();
        *count = count.saturating_sub(1);
        Ok(())
    }

    fn reset(&self) -> ServerResult<()> {
        let mut directory = self.inner.lock();
        for host in &self.hosts {
            directory.member_count.insert(host.clone(), 0);
        }
        Ok(())
    }
}
