//! Group locks: binary mutexes whose state is an element of Z/2Z.
//!
//! Acquire moves a lock from the identity to `Locked` with one CAS
//! (0 + 1 = 1); release adds `Locked` again (1 + 1 = 0). A fixed table of
//! [`MAX_GROUPLOCKS`] slots holds them. The table lock only orders
//! create/destroy against existence checks; the state transitions
//! themselves never take it.

mod atomic;
mod group;
mod verify;

pub use atomic::AtomicGroupCell;
pub use group::{Group, Z2};
pub use verify::{
    VerifyError, verify_all, verify_atomic_group_operations, verify_deadlock_freedom,
    verify_group_properties,
};

use core::fmt;
use core::sync::atomic::{Ordering, fence};

use kcore_error::define_kernel_error;
use kcore_hal::{IrqSafeLock, Pid, TaskContext, interrupts};
use kcore_utils::FixedName;

pub const MAX_GROUPLOCKS: usize = 64;
/// Name buffer size; one byte short of it is kept.
pub const NAME_CAPACITY: usize = 16;

pub type LockName = FixedName<NAME_CAPACITY>;

define_kernel_error! {
    /// Group lock operation failure.
    pub enum GroupLockError(0x10) {
        /// Id outside [0, MAX_GROUPLOCKS)
        InvalidId = 0x01, status -1 => "Invalid group lock id",
        NotFound = 0x02, status -2 => "Group lock does not exist",
        AlreadyExists = 0x03, status -2 => "Group lock already exists",
        NotHolder = 0x04, status -3 => "Caller does not hold the group lock",
        /// Destroy attempted while locked
        Busy = 0x05, status -3 => "Group lock is held",
    }
}

fn slot(id: i64) -> Result<usize, GroupLockError> {
    usize::try_from(id)
        .ok()
        .filter(|&i| i < MAX_GROUPLOCKS)
        .ok_or(GroupLockError::InvalidId)
}

/// Informational fields, guarded by the per-lock debug lock.
#[derive(Clone, Copy)]
struct LockInfo {
    holder: Option<Pid>,
    acquire_time: u64,
    ref_count: u32,
    name: LockName,
}

impl LockInfo {
    const fn vacant() -> Self {
        Self {
            holder: None,
            acquire_time: 0,
            ref_count: 0,
            name: LockName::empty(),
        }
    }
}

struct GroupLock {
    state: AtomicGroupCell<Z2>,
    info: IrqSafeLock<LockInfo>,
}

impl GroupLock {
    fn new() -> Self {
        Self {
            state: AtomicGroupCell::new(Z2::IDENTITY),
            info: IrqSafeLock::new(LockInfo::vacant()),
        }
    }
}

/// Point-in-time view of one slot, as rendered by the debug syscall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupLockInfo {
    pub id: usize,
    pub bound: bool,
    pub name: LockName,
    pub state: Z2,
    pub holder: Option<Pid>,
    pub acquire_time: u64,
    pub ref_count: u32,
}

impl GroupLockInfo {
    pub fn inverse(&self) -> Z2 {
        self.state.inverse()
    }

    pub fn distance_to_identity(&self) -> u8 {
        self.state.distance_to_identity()
    }
}

impl fmt::Display for GroupLockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bound {
            writeln!(f, "=== grouplock {} \"{}\" ===", self.id, self.name)?;
        } else {
            writeln!(f, "=== grouplock {} (unbound) ===", self.id)?;
        }
        writeln!(
            f,
            "state: {} ({}) in Z/2Z, inverse {}, distance to identity {}",
            self.state,
            self.state.label(),
            self.inverse(),
            self.distance_to_identity()
        )?;
        match self.holder {
            Some(pid) => writeln!(f, "holder: pid {pid} since tick {}", self.acquire_time)?,
            None => writeln!(f, "holder: none")?,
        }
        write!(f, "refs: {}", self.ref_count)
    }
}

/// Fixed table of group locks.
pub struct GroupLockTable {
    bound: IrqSafeLock<[bool; MAX_GROUPLOCKS]>,
    locks: [GroupLock; MAX_GROUPLOCKS],
}

impl GroupLockTable {
    /// Empty table. Does not run the self-checks; see [`GroupLockTable::init`].
    pub fn new() -> Self {
        Self {
            bound: IrqSafeLock::new([false; MAX_GROUPLOCKS]),
            locks: core::array::from_fn(|_| GroupLock::new()),
        }
    }

    /// Verify the lock algebra, then build an empty table.
    ///
    /// A failed verification means the lock cannot be trusted, so it panics.
    #[allow(clippy::panic)]
    pub fn init() -> Self {
        if let Err(e) = verify_all::<Z2>() {
            panic!("GroupLock: group verification failed: {e}");
        }
        log::info!("[GROUPLOCK] {MAX_GROUPLOCKS} slots ready, Z/2Z laws verified");
        Self::new()
    }

    fn bound_lock(&self, id: i64) -> Result<&GroupLock, GroupLockError> {
        let idx = slot(id)?;
        if !self.bound.lock()[idx] {
            return Err(GroupLockError::NotFound);
        }
        Ok(&self.locks[idx])
    }

    /// Bind slot `id` to a fresh, unlocked lock.
    pub fn create(&self, id: i64, name: impl Into<LockName>) -> Result<(), GroupLockError> {
        let idx = slot(id)?;
        let name = name.into();

        let mut bound = self.bound.lock();
        if bound[idx] {
            return Err(GroupLockError::AlreadyExists);
        }
        let lock = &self.locks[idx];
        lock.state.store(Z2::IDENTITY, Ordering::Release);
        *lock.info.lock() = LockInfo {
            holder: None,
            acquire_time: 0,
            ref_count: 1,
            name,
        };
        bound[idx] = true;
        drop(bound);

        log::info!("[GROUPLOCK] created lock {idx} ({name}) at identity");
        Ok(())
    }

    /// Take the lock, spinning with yields until it is free.
    ///
    /// There is no timeout and no fairness between waiters.
    pub fn acquire(&self, id: i64, ctx: &impl TaskContext) -> Result<(), GroupLockError> {
        let lock = self.bound_lock(id)?;
        let pid = ctx.current_pid();

        let mut irq = interrupts::disable();
        log::trace!("[GROUPLOCK] pid {pid} attempting lock {id}");
        while lock
            .state
            .try_transition(Z2::Identity, Z2::Locked)
            .is_err()
        {
            // Let the holder run
            interrupts::restore(irq);
            ctx.yield_now();
            irq = interrupts::disable();
        }

        {
            let mut info = lock.info.lock();
            info.holder = Some(pid);
            info.acquire_time = ctx.ticks();
        }
        fence(Ordering::Acquire);
        log::trace!("[GROUPLOCK] pid {pid} acquired lock {id} (0 + 1 = 1)");
        interrupts::restore(irq);
        Ok(())
    }

    /// Give the lock back. Only the recorded holder may release.
    pub fn release(&self, id: i64, ctx: &impl TaskContext) -> Result<(), GroupLockError> {
        let lock = self.bound_lock(id)?;
        let pid = ctx.current_pid();

        let irq = interrupts::disable();
        let was_holder = {
            let mut info = lock.info.lock();
            let was_holder = info.holder == Some(pid);
            if was_holder {
                info.holder = None;
                info.acquire_time = 0;
            }
            was_holder
        };
        if !was_holder {
            interrupts::restore(irq);
            return Err(GroupLockError::NotHolder);
        }

        fence(Ordering::Release);
        let prev = lock.state.apply(Z2::Locked);
        if prev == Z2::Locked {
            log::trace!("[GROUPLOCK] pid {pid} released lock {id} (1 + 1 = 0)");
        } else {
            log::warn!("[GROUPLOCK] lock {id} released from unexpected state {prev}");
        }
        interrupts::restore(irq);
        Ok(())
    }

    /// Unbind slot `id`. Refused while the lock is held.
    pub fn destroy(&self, id: i64) -> Result<(), GroupLockError> {
        let idx = slot(id)?;

        let mut bound = self.bound.lock();
        if !bound[idx] {
            return Err(GroupLockError::NotFound);
        }
        let lock = &self.locks[idx];
        if !lock.state.load(Ordering::Acquire).is_identity() {
            return Err(GroupLockError::Busy);
        }
        bound[idx] = false;
        lock.info.lock().ref_count = 0;
        drop(bound);

        log::info!("[GROUPLOCK] destroyed lock {idx}");
        Ok(())
    }

    /// Snapshot of slot `id`, bound or not.
    pub fn debug_info(&self, id: i64) -> Result<GroupLockInfo, GroupLockError> {
        let idx = slot(id).inspect_err(|_| log::warn!("[GROUPLOCK] invalid group_id {id}"))?;
        let lock = &self.locks[idx];
        let bound = self.bound.lock()[idx];

        let info = lock.info.lock();
        Ok(GroupLockInfo {
            id: idx,
            bound,
            name: info.name,
            state: lock.state.load(Ordering::Acquire),
            holder: info.holder,
            acquire_time: info.acquire_time,
            ref_count: info.ref_count,
        })
    }

    pub fn is_bound(&self, id: i64) -> bool {
        slot(id).is_ok_and(|idx| self.bound.lock()[idx])
    }

    pub fn state(&self, id: i64) -> Result<Z2, GroupLockError> {
        let idx = slot(id)?;
        Ok(self.locks[idx].state.load(Ordering::Acquire))
    }
}

impl Default for GroupLockTable {
    fn default() -> Self {
        Self::new()
    }
}
