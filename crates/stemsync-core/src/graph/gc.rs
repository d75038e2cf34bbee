//! Deferred deallocation for stem audio
//!
//! Decoded stems are large (tens of MB per stem). A graph's renderer can end
//! up holding the last reference when its output stream is torn down, so the
//! buffers are wrapped in `basedrop::Shared`: dropping one on the audio thread
//! only enqueues the pointer, and a background collector frees it.
//!
//! ```ignore
//! use basedrop::Shared;
//! use crate::graph::gc::gc_handle;
//!
//! let audio = Shared::new(&gc_handle(), StereoBuffer::silence(48_000));
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating Shared<T> allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread frees deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    // Collector is !Sync, so it lives on its own thread
    thread::Builder::new()
        .name("stem-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Stem GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn stem GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating Shared<T> allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_shared_allocation_and_drop() {
        let value = Shared::new(&gc_handle(), vec![0.0f32; 1024]);
        let clone = Shared::clone(&value);
        assert_eq!(clone.len(), 1024);
        drop(value);
        drop(clone);
    }
}
