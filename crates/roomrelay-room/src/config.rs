//! Room configuration.

/// Settings shared by every room a worker hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    /// Maximum simultaneous members. Never below one.
    pub capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { capacity: 4 }
    }
}

impl RoomConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }.validated()
    }

    /// Clamps a zero capacity to one.
    pub fn validated(mut self) -> Self {
        if self.capacity == 0 {
            tracing::warn!("room capacity of 0 clamped to 1");
            self.capacity = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(RoomConfig::default().capacity, 4);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(RoomConfig::with_capacity(0).capacity, 1);
        assert_eq!(RoomConfig::with_capacity(7).capacity, 7);
    }
}
