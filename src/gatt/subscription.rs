use std::collections::HashMap;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{DeviceHandle, Uuid};

use super::*;

/// Per-client notification and indication state, keyed by device and
/// characteristic UUID. Only enabled configurations are stored.
#[derive(Debug, Default)]
pub struct SubscriptionTracker(Mutex<HashMap<(DeviceHandle, Uuid), Cccd>>);

impl SubscriptionTracker {
    /// Creates an empty tracker.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the configuration of a characteristic for the specified device
    /// and returns the previous one.
    pub fn set(&self, dev: DeviceHandle, ch: Uuid, v: Cccd) -> Cccd {
        let mut m = self.0.lock();
        let prev = if v.is_enabled() {
            m.insert((dev, ch), v)
        } else {
            m.remove(&(dev, ch))
        };
        prev.unwrap_or_default()
    }

    /// Returns the configuration of a characteristic for the specified device.
    #[must_use]
    pub fn get(&self, dev: DeviceHandle, ch: Uuid) -> Cccd {
        (self.0.lock().get(&(dev, ch)).copied()).unwrap_or_default()
    }

    /// Returns all devices subscribed to the characteristic.
    #[must_use]
    pub fn subscribers(&self, ch: Uuid) -> SmallVec<[(DeviceHandle, Cccd); 4]> {
        let mut v: SmallVec<[_; 4]> = (self.0.lock().iter())
            .filter(|&(&(_, c), _)| c == ch)
            .map(|(&(dev, _), &cfg)| (dev, cfg))
            .collect();
        v.sort_unstable_by_key(|&(dev, _)| dev);
        v
    }

    /// Removes all subscriptions of the specified device and returns the
    /// affected characteristics.
    pub fn remove_device(&self, dev: DeviceHandle) -> Vec<(Uuid, Cccd)> {
        let mut removed = Vec::new();
        self.0.lock().retain(|&(d, ch), &mut cfg| {
            let keep = d != dev;
            if !keep {
                removed.push((ch, cfg));
            }
            keep
        });
        removed.sort_unstable_by_key(|&(ch, _)| ch);
        removed
    }

    /// Removes all subscriptions to the specified characteristics.
    pub fn remove_characteristics(&self, chars: &[Uuid]) -> Vec<(DeviceHandle, Uuid)> {
        let mut removed = Vec::new();
        self.0.lock().retain(|&(dev, ch), _| {
            let keep = !chars.contains(&ch);
            if !keep {
                removed.push((dev, ch));
            }
            keep
        });
        removed.sort_unstable();
        removed
    }

    /// Removes all subscriptions.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::uuid16;

    use super::*;

    #[test]
    fn set_get() {
        let t = SubscriptionTracker::new();
        let (d1, d2) = (DeviceHandle(1), DeviceHandle(2));
        let c = uuid16(0x5678).as_uuid();
        assert_eq!(t.get(d1, c), Cccd::Disabled);
        assert_eq!(t.set(d1, c, Cccd::Notify), Cccd::Disabled);
        assert_eq!(t.set(d1, c, Cccd::Notify), Cccd::Notify);
        assert_eq!(t.set(d2, c, Cccd::Indicate), Cccd::Disabled);
        assert_eq!(
            t.subscribers(c).as_slice(),
            [(d1, Cccd::Notify), (d2, Cccd::Indicate)]
        );
        assert_eq!(t.set(d1, c, Cccd::Disabled), Cccd::Notify);
        assert_eq!(t.get(d1, c), Cccd::Disabled);
        assert_eq!(t.subscribers(c).as_slice(), [(d2, Cccd::Indicate)]);
    }

    #[test]
    fn remove() {
        let t = SubscriptionTracker::new();
        let (d1, d2) = (DeviceHandle(1), DeviceHandle(2));
        let (a, b) = (uuid16(0x2A37).as_uuid(), uuid16(0x2A38).as_uuid());
        t.set(d1, a, Cccd::Notify);
        t.set(d1, b, Cccd::Indicate);
        t.set(d2, a, Cccd::Notify);
        assert_eq!(t.remove_device(d1), [(a, Cccd::Notify), (b, Cccd::Indicate)]);
        assert!(t.remove_device(d1).is_empty());
        assert_eq!(t.get(d2, a), Cccd::Notify);
        assert_eq!(t.remove_characteristics(&[a, b]), [(d2, a)]);
        assert!(t.subscribers(a).is_empty());
    }
}
