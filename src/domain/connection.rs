//! Network connectivity snapshot.

/// Last known network connectivity as reported by the platform notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Nobody is monitoring connectivity.
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl Connectivity {
    /// Maps a notifier boolean onto a snapshot.
    #[must_use]
    pub const fn from_connected(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }

    /// Returns true unless the network is known to be down.
    #[must_use]
    pub const fn may_be_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}
