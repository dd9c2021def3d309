//! Native stack bounds.
//!
//! A transaction never logs writes to its own stack frames: those frames are
//! gone by the time an undo could run. The runtime needs the lowest address
//! of the thread's stack for that check, which only the platform knows.

use crate::types::StackRange;
use std::hint::black_box;

/// Source of the calling thread's native stack bounds.
pub trait StackBounds {
    /// Returns the stack range of the calling thread, or `None` if unknown.
    fn thread_stack(&self) -> Option<StackRange>;
}

/// Stack bounds reported by the operating system's thread library.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformStackBounds;

impl StackBounds for PlatformStackBounds {
    fn thread_stack(&self) -> Option<StackRange> {
        platform_thread_stack()
    }
}

/// Fixed stack bounds, for tests and threads running on custom stacks.
#[derive(Debug, Clone, Copy)]
pub struct FixedStackBounds(pub StackRange);

impl StackBounds for FixedStackBounds {
    fn thread_stack(&self) -> Option<StackRange> {
        Some(self.0)
    }
}

/// Returns the address of `local` as an opaque stack marker.
///
/// Every frame called after this point sits below the returned address,
/// since stacks grow downwards on all supported targets.
#[inline(always)]
pub fn frame_address<T>(local: &T) -> usize {
    black_box(local as *const T) as usize
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn platform_thread_stack() -> Option<StackRange> {
    use std::mem::MaybeUninit;

    // SAFETY: the attribute object is initialized by pthread_getattr_np
    // before it is read, and destroyed exactly once.
    unsafe {
        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        if libc::pthread_getattr_np(libc::pthread_self(), attr.as_mut_ptr()) != 0 {
            return None;
        }
        let mut attr = attr.assume_init();

        let mut base: *mut libc::c_void = std::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &mut base, &mut size);
        libc::pthread_attr_destroy(&mut attr);

        if rc != 0 || base.is_null() || size == 0 {
            return None;
        }
        let low = base as usize;
        Some(StackRange::new(low, low + size))
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn platform_thread_stack() -> Option<StackRange> {
    // SAFETY: both queries only read the calling thread's descriptor.
    unsafe {
        let thread = libc::pthread_self();
        let high = libc::pthread_get_stackaddr_np(thread) as usize;
        let size = libc::pthread_get_stacksize_np(thread);
        if high == 0 || size == 0 || size > high {
            return None;
        }
        Some(StackRange::new(high - size, high))
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
fn platform_thread_stack() -> Option<StackRange> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_bounds_report_their_range() {
        let range = StackRange::new(0x1000, 0x9000);
        assert_eq!(FixedStackBounds(range).thread_stack(), Some(range));
    }

    #[test]
    fn frame_address_is_stable() {
        let local = 0u64;
        assert_eq!(frame_address(&local), &local as *const u64 as usize);
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn platform_bounds_contain_a_local() {
        let local = 0u8;
        let range = PlatformStackBounds
            .thread_stack()
            .expect("stack bounds on a supported platform");
        assert!(range.contains(frame_address(&local)), "{range} misses local");
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn spawned_threads_have_their_own_stack() {
        let main = PlatformStackBounds.thread_stack().unwrap();
        let spawned = std::thread::spawn(|| {
            let local = 0u8;
            let range = PlatformStackBounds.thread_stack().unwrap();
            (range, frame_address(&local))
        })
        .join()
        .unwrap();

        assert!(spawned.0.contains(spawned.1));
        assert!(!main.contains(spawned.1));
    }
}
