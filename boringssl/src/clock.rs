//! Wall clock based on the host's system time.

extern crate std;

use kmr_common::crypto;
use log::warn;

/// [`crypto::WallClock`] implementation based on [`std::time::SystemTime`].
#[derive(Default)]
pub struct StdClock;

impl crypto::WallClock for StdClock {
    fn now(&self) -> crypto::MillisecondsSinceEpoch {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(elapsed) => crypto::MillisecondsSinceEpoch(elapsed.as_millis() as u64),
            Err(e) => {
                warn!("system time is before the epoch: {:?}", e);
                crypto::MillisecondsSinceEpoch(0)
            }
        }
    }
}
