//! Crash injection utilities for testing commit atomicity.
//!
//! Provides a [`CrashInjector`] that counts writer operations and reports
//! when a simulated crash should occur. A test wraps a real writer and fails
//! the operation at which the injector fires, leaving the backend in the
//! partial state a crash at that point would leave.
//!
//! # Crash Points
//!
//! The [`CrashPoint`] enum models specific points in a commit:
//!
//! ```text
//! Write node pages → Write indirect pages → Write revision root → Write beacon
//!        ↑                                                             ↑
//!  AfterPageWrites(n)                                            BeforeBeacon
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

/// Points in a commit where a crash can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// Crash on the page write following `n` successful ones.
    ///
    /// On-disk state: some pages of the new revision are persisted but
    /// nothing references them. The beacon still names the previous revision.
    AfterPageWrites(u32),

    /// Crash when publishing the beacon, after every page was written.
    ///
    /// On-disk state: the complete new revision is persisted but unpublished.
    BeforeBeacon,
}

/// Tracks crash injection state for deterministic crash simulation.
///
/// # Thread Safety
///
/// All state is atomic, making `CrashInjector` safe to share across threads.
#[derive(Debug)]
pub struct CrashInjector {
    /// The crash point to trigger.
    crash_point: CrashPoint,
    /// Number of page writes observed.
    page_write_count: AtomicU32,
    /// Number of beacon writes observed.
    beacon_write_count: AtomicU32,
    /// Whether the crash has been triggered.
    crashed: AtomicBool,
    /// Whether injection is armed (enabled).
    armed: AtomicBool,
}

impl CrashInjector {
    /// Creates a new crash injector targeting the specified crash point.
    pub fn new(crash_point: CrashPoint) -> Arc<Self> {
        Arc::new(Self {
            crash_point,
            page_write_count: AtomicU32::new(0),
            beacon_write_count: AtomicU32::new(0),
            crashed: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        })
    }

    /// Arms the injector so it will trigger on the next matching operation.
    ///
    /// The injector starts disarmed to allow setup operations (creating the
    /// storage, committing initial data) without interference.
    pub fn arm(&self) {
        self.page_write_count.store(0, Ordering::SeqCst);
        self.beacon_write_count.store(0, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Disarms the injector.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Checks if the crash has been triggered.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Records a page write and checks if a crash should occur.
    ///
    /// Returns `true` if the write should fail.
    pub fn on_page_write(&self) -> bool {
        if !self.is_live() {
            return false;
        }
        let count = self.page_write_count.fetch_add(1, Ordering::SeqCst);
        let should_crash = matches!(self.crash_point, CrashPoint::AfterPageWrites(n) if count >= n);
        self.record(should_crash)
    }

    /// Records a beacon write and checks if a crash should occur.
    ///
    /// Returns `true` if the write should fail.
    pub fn on_beacon_write(&self) -> bool {
        if !self.is_live() {
            return false;
        }
        self.beacon_write_count.fetch_add(1, Ordering::SeqCst);
        let should_crash = matches!(self.crash_point, CrashPoint::BeforeBeacon);
        self.record(should_crash)
    }

    /// Returns the configured crash point.
    pub fn crash_point(&self) -> CrashPoint {
        self.crash_point
    }

    /// Returns the number of page writes observed since arming.
    pub fn page_write_count(&self) -> u32 {
        self.page_write_count.load(Ordering::SeqCst)
    }

    /// Returns the number of beacon writes observed since arming.
    pub fn beacon_write_count(&self) -> u32 {
        self.beacon_write_count.load(Ordering::SeqCst)
    }

    fn is_live(&self) -> bool {
        self.armed.load(Ordering::SeqCst) && !self.crashed.load(Ordering::SeqCst)
    }

    fn record(&self, should_crash: bool) -> bool {
        if should_crash {
            self.crashed.store(true, Ordering::SeqCst);
        }
        should_crash
    }
}
