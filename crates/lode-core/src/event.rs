// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Engine lifecycle events and the channel that carries them.

use crate::key::Key;
use crate::pipeline::DataSource;

/// Something observable happened inside the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new job was started for `key`.
    JobStarted {
        /// The job's key.
        key: Key,
    },
    /// A job produced its resource.
    JobCompleted {
        /// The job's key.
        key: Key,
        /// Where the data came from.
        source: DataSource,
    },
    /// A job failed; the message is the error's display form.
    JobFailed {
        /// The job's key.
        key: Key,
        /// Rendered error.
        message: String,
    },
    /// The last callback of a job went away before it finished.
    JobCancelled {
        /// The job's key.
        key: Key,
    },
    /// A resource left the active set.
    ResourceReleased {
        /// The resource's key.
        key: Key,
        /// Whether it went into the memory cache (otherwise it was recycled).
        cached: bool,
    },
    /// The sweep recovered resources whose leases were dropped without release.
    AbandonedRecovered {
        /// How many entries were recovered.
        count: usize,
    },
}

/// An unbounded, multi-producer event channel.
///
/// Publishing never blocks. When every receiver is gone the event is dropped and
/// an error is logged.
#[derive(Debug)]
pub struct EventBus<T: Send + 'static> {
    sender: flume::Sender<T>,
    receiver: flume::Receiver<T>,
}

impl<T: Send + 'static> EventBus<T> {
    /// Creates a bus with an unbounded channel.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        log::debug!("EventBus: created for {}", std::any::type_name::<T>());
        Self { sender, receiver }
    }

    /// Sends `event` to whoever listens.
    pub fn publish(&self, event: T) {
        log::trace!("EventBus: publishing event.");
        if let Err(e) = self.sender.send(event) {
            log::error!("EventBus: failed to send event: {e}");
        }
    }

    /// A clonable sender for other producers.
    pub fn sender(&self) -> flume::Sender<T> {
        self.sender.clone()
    }

    /// A receiver; every clone competes for the same events.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        self.receiver.clone()
    }

    /// Takes every event currently queued, without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

impl<T: Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn publish_then_drain_preserves_order() {
        let bus = EventBus::<u32>::new();
        bus.publish(1);
        bus.publish(2);
        bus.publish(3);
        assert_eq!(bus.drain(), vec![1, 2, 3]);
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn events_cross_threads() {
        let bus = EventBus::<EngineEvent>::new();
        let sender = bus.sender();
        let receiver = bus.subscribe();

        let handle = thread::spawn(move || {
            sender
                .send(EngineEvent::AbandonedRecovered { count: 2 })
                .expect("receiver alive");
        });
        handle.join().expect("producer thread panicked");

        match receiver.recv_timeout(Duration::from_millis(200)) {
            Ok(EngineEvent::AbandonedRecovered { count }) => assert_eq!(count, 2),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
