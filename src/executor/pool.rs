use parking_lot::Mutex;

/// A simulated client. Runs one iteration at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualUser {
    id: u64,
    iterations: u64,
}

impl VirtualUser {
    pub fn new(id: u64) -> Self {
        Self { id, iterations: 0 }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Iterations this VU has completed
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub(crate) fn record_iteration(&mut self) {
        self.iterations += 1;
    }
}

/// Outcome of asking the pool for a VU
#[derive(Debug)]
pub enum Acquired {
    /// Reused an idle VU
    Idle(VirtualUser),
    /// No VU was idle; a new one was created below the cap
    Allocated(VirtualUser),
    /// All VUs busy and the pool is at its cap
    Exhausted,
}

#[derive(Debug)]
struct PoolState {
    idle: Vec<VirtualUser>,
    allocated: u64,
}

/// Bounded pool of VUs backing the arrival-rate executor.
#[derive(Debug)]
pub struct VuPool {
    state: Mutex<PoolState>,
    max: u64,
}

impl VuPool {
    /// Create `pre_allocated` VUs up front; the pool never grows past `max`.
    pub fn new(pre_allocated: u64, max: u64) -> Self {
        let max = max.max(pre_allocated);
        // popped from the back, so VU 1 is handed out first
        let idle = (1..=pre_allocated).rev().map(VirtualUser::new).collect();
        Self {
            state: Mutex::new(PoolState {
                idle,
                allocated: pre_allocated,
            }),
            max,
        }
    }

    pub fn acquire(&self) -> Acquired {
        let mut state = self.state.lock();
        if let Some(vu) = state.idle.pop() {
            return Acquired::Idle(vu);
        }
        if state.allocated < self.max {
            state.allocated += 1;
            return Acquired::Allocated(VirtualUser::new(state.allocated));
        }
        Acquired::Exhausted
    }

    pub fn release(&self, vu: VirtualUser) {
        self.state.lock().idle.push(vu);
    }

    pub fn allocated(&self) -> u64 {
        self.state.lock().allocated
    }

    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_allocated_handed_out_first() {
        let pool = VuPool::new(2, 3);
        assert!(matches!(pool.acquire(), Acquired::Idle(vu) if vu.id() == 1));
        assert!(matches!(pool.acquire(), Acquired::Idle(vu) if vu.id() == 2));
        assert!(matches!(pool.acquire(), Acquired::Allocated(vu) if vu.id() == 3));
        assert!(matches!(pool.acquire(), Acquired::Exhausted));
        assert_eq!(pool.allocated(), 3);
    }

    #[test]
    fn test_release_makes_vu_reusable() {
        let pool = VuPool::new(1, 1);
        let vu = match pool.acquire() {
            Acquired::Idle(vu) => vu,
            other => panic!("expected idle VU, got {other:?}"),
        };
        assert!(matches!(pool.acquire(), Acquired::Exhausted));
        pool.release(vu);
        assert_eq!(pool.idle(), 1);
        assert!(matches!(pool.acquire(), Acquired::Idle(_)));
    }

    #[test]
    fn test_max_never_below_pre_allocated() {
        let pool = VuPool::new(4, 2);
        assert_eq!(pool.max(), 4);
        assert_eq!(pool.idle(), 4);
    }
}
