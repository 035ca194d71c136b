//! Memory bounds when decoding hostile round payloads

#![allow(clippy::unwrap_used)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use zeno_net::protocol::envelope::Envelope;

struct CountingAlloc;

static CURRENT: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            let now = CURRENT.fetch_add(layout.size(), Ordering::SeqCst) + layout.size();
            PEAK.fetch_max(now, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        CURRENT.fetch_sub(layout.size(), Ordering::SeqCst);
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc;

const INPUT_SIZE: usize = 1 << 20;

/// A KMD to ETH ProposeTx step whose inventory count claims one entry per
/// remaining input byte.
fn inflated_inventory() -> Vec<u8> {
    let mut payload = vec![0x77; 16];
    payload.extend_from_slice(&[0xab; 65]);
    payload.extend_from_slice(&[0x01, 0x00, 0x02, 0x00, 0x00, 0x00]);
    let count = (INPUT_SIZE - payload.len() - 8) as u64;
    payload.extend_from_slice(&count.to_be_bytes());
    payload.resize(INPUT_SIZE, 0xff);
    payload
}

#[test]
fn test_inventory_count_does_not_drive_allocation() {
    let payload = inflated_inventory();
    assert_eq!(payload.len(), INPUT_SIZE);

    let baseline = CURRENT.load(Ordering::SeqCst);
    PEAK.store(baseline, Ordering::SeqCst);

    let result = Envelope::decode(&payload);

    let grown = PEAK.load(Ordering::SeqCst) - baseline;
    assert!(result.is_err());
    assert!(
        grown < 4 * INPUT_SIZE,
        "decode reserved {grown} bytes for a {INPUT_SIZE} byte payload"
    );
}
