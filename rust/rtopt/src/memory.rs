// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::hint::black_box;

use anyhow::anyhow;
use anyhow::Result;
use log::debug;

use crate::config::RealtimeConfig;
use crate::platform::Platform;
use crate::platform::RlimitResource;

const STACK_CHUNK: usize = 4096;

/// Lift RLIMIT_MEMLOCK and RLIMIT_RTPRIO. Real-time threads and locked
/// memory don't work without both, so failure is returned to the caller as
/// fatal.
pub fn raise_limits(platform: &dyn Platform) -> Result<()> {
    platform.set_rlimit_infinity(RlimitResource::Memlock)?;
    platform.set_rlimit_infinity(RlimitResource::Rtprio)?;
    Ok(())
}

/// Touch `bytes` of stack below the caller so those pages are resident
/// before mlockall(). One page-sized frame per call; the frames are popped
/// again on return.
#[inline(never)]
fn prefault_stack(bytes: usize) {
    let mut chunk = [0u8; STACK_CHUNK];
    for byte in chunk.iter_mut() {
        unsafe { std::ptr::write_volatile(byte, 0) };
    }
    if bytes > STACK_CHUNK {
        prefault_stack(bytes - STACK_CHUNK);
    }
    // keep the frame alive across the recursive call
    black_box(&chunk);
}

/// Commit `bytes` of heap, zero it and hand it back to the allocator so its
/// free lists are warm.
fn prefault_heap(bytes: usize) -> Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|e| anyhow!("heap reserve of {} bytes failed: {}", bytes, e))?;
    buf.resize(bytes, 0);
    black_box(&buf);
    Ok(())
}

/// Pre-fault the configured stack and heap reserves, then lock all
/// resident pages if `memlock` is set.
pub fn lock_memory(rtcfg: &RealtimeConfig, platform: &dyn Platform) -> Result<()> {
    if !rtcfg.enabled {
        debug!("LockMemory: realtime_option disabled");
        return Ok(());
    }

    if rtcfg.stack_reserve != 0 {
        debug!("LockMemory: stack_reserve {}", rtcfg.stack_reserve);
        prefault_stack(rtcfg.stack_reserve);
    }

    if rtcfg.heap_reserve != 0 {
        debug!("LockMemory: heap_reserve {}", rtcfg.heap_reserve);
        prefault_heap(rtcfg.heap_reserve)?;
    }

    if !rtcfg.memlock {
        debug!("LockMemory: memlock disabled");
        return Ok(());
    }

    debug!("LockMemory: mlockall");
    platform.lock_all_memory()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefault_stack() {
        // Well under the 2M default test thread stack.
        prefault_stack(256 * 1024);
        prefault_stack(1);
    }

    #[test]
    fn test_prefault_heap() {
        prefault_heap(4 * 1024 * 1024).unwrap();
    }

    #[test]
    fn test_prefault_heap_too_large() {
        assert!(prefault_heap(usize::MAX).is_err());
    }
}
