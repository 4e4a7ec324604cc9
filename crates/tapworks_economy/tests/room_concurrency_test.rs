//! Integration tests for per-room serialization against slow and failing stores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use num_bigint::BigInt;
use tapworks_economy::{
    Adding, Buying, Economy, EconomyError, EconomyResult, ItemCatalog, ItemFormula, ItemId,
    LedgerStore, ManualClock, MemoryLedger,
};

fn catalog() -> Arc<ItemCatalog> {
    Arc::new(
        ItemCatalog::new([ItemFormula {
            item_id: 1,
            power_a: 0,
            power_b: 1,
            power_c: 0,
            power_d: 5,
            price_a: 0,
            price_b: 1,
            price_c: 0,
            price_d: 10,
        }])
        .unwrap(),
    )
}

/// Sleeps inside `set_increment` for one room and records write order.
struct DelayedLedger {
    inner: MemoryLedger,
    slow_room: &'static str,
    delay: Duration,
    log: Mutex<Vec<(String, &'static str)>>,
}

impl DelayedLedger {
    fn new(slow_room: &'static str, delay: Duration) -> Self {
        Self { inner: MemoryLedger::new(), slow_room, delay, log: Mutex::new(Vec::new()) }
    }
}

impl LedgerStore for DelayedLedger {
    fn get_increment(&self, room: &str, time: i64) -> EconomyResult<Option<BigInt>> {
        self.inner.get_increment(room, time)
    }

    fn set_increment(&self, room: &str, time: i64, amount: &BigInt) -> EconomyResult<()> {
        self.log.lock().unwrap().push((room.to_string(), "begin"));
        if room == self.slow_room {
            thread::sleep(self.delay);
        }
        let result = self.inner.set_increment(room, time, amount);
        self.log.lock().unwrap().push((room.to_string(), "end"));
        result
    }

    fn increments_through(&self, room: &str, through: i64) -> EconomyResult<Vec<Adding>> {
        self.inner.increments_through(room, through)
    }

    fn increments_after(&self, room: &str, after: i64) -> EconomyResult<Vec<Adding>> {
        self.inner.increments_after(room, after)
    }

    fn delete_increments_through(&self, room: &str, through: i64) -> EconomyResult<()> {
        self.inner.delete_increments_through(room, through)
    }

    fn compact_increments(&self, room: &str, through: i64, total: &BigInt) -> EconomyResult<()> {
        self.inner.compact_increments(room, through, total)
    }

    fn append_purchase(&self, room: &str, buying: Buying) -> EconomyResult<()> {
        self.inner.append_purchase(room, buying)
    }

    fn purchases_by_time(&self, room: &str) -> EconomyResult<Vec<Buying>> {
        self.inner.purchases_by_time(room)
    }

    fn count_purchases(&self, room: &str, item_id: ItemId) -> EconomyResult<u32> {
        self.inner.count_purchases(room, item_id)
    }
}

/// Fails every write while `failing` is set.
struct FlakyLedger {
    inner: MemoryLedger,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FlakyLedger {
    fn fail_if_set(&self) -> EconomyResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EconomyError::Store("disk unplugged".to_string()));
        }
        Ok(())
    }
}

impl LedgerStore for FlakyLedger {
    fn get_increment(&self, room: &str, time: i64) -> EconomyResult<Option<BigInt>> {
        self.inner.get_increment(room, time)
    }

    fn set_increment(&self, room: &str, time: i64, amount: &BigInt) -> EconomyResult<()> {
        self.fail_if_set()?;
        self.inner.set_increment(room, time, amount)
    }

    fn increments_through(&self, room: &str, through: i64) -> EconomyResult<Vec<Adding>> {
        self.inner.increments_through(room, through)
    }

    fn increments_after(&self, room: &str, after: i64) -> EconomyResult<Vec<Adding>> {
        self.inner.increments_after(room, after)
    }

    fn delete_increments_through(&self, room: &str, through: i64) -> EconomyResult<()> {
        self.fail_if_set()?;
        self.inner.delete_increments_through(room, through)
    }

    fn compact_increments(&self, room: &str, through: i64, total: &BigInt) -> EconomyResult<()> {
        self.fail_if_set()?;
        self.inner.compact_increments(room, through, total)
    }

    fn append_purchase(&self, room: &str, buying: Buying) -> EconomyResult<()> {
        self.fail_if_set()?;
        self.inner.append_purchase(room, buying)
    }

    fn purchases_by_time(&self, room: &str) -> EconomyResult<Vec<Buying>> {
        self.inner.purchases_by_time(room)
    }

    fn count_purchases(&self, room: &str, item_id: ItemId) -> EconomyResult<u32> {
        self.inner.count_purchases(room, item_id)
    }
}

#[test]
fn test_same_room_is_serialized() {
    let ledger = Arc::new(DelayedLedger::new("slow", Duration::from_millis(100)));
    let clock = Arc::new(ManualClock::new(1000));
    let economy = Arc::new(Economy::new(catalog(), ledger.clone()).with_clock(clock));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let economy = Arc::clone(&economy);
            thread::spawn(move || {
                economy.apply_increment("slow", &BigInt::from(1), 1000).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // No interleaving: every begin is followed by its own end.
    let log = ledger.log.lock().unwrap();
    let phases: Vec<&str> = log.iter().map(|(_, phase)| *phase).collect();
    assert_eq!(phases, vec!["begin", "end", "begin", "end"]);

    // Both read-modify-writes landed.
    assert_eq!(ledger.get_increment("slow", 1000).unwrap(), Some(BigInt::from(2)));
}

#[test]
fn test_other_rooms_do_not_wait() {
    let ledger = Arc::new(DelayedLedger::new("slow", Duration::from_millis(300)));
    let clock = Arc::new(ManualClock::new(1000));
    let economy = Arc::new(Economy::new(catalog(), ledger.clone()).with_clock(clock));

    let slow = {
        let economy = Arc::clone(&economy);
        thread::spawn(move || {
            economy.apply_increment("slow", &BigInt::from(1), 1000).unwrap();
        })
    };

    // Let the slow write take the room lock first.
    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    economy.apply_increment("fast", &BigInt::from(1), 1000).unwrap();
    assert!(start.elapsed() < Duration::from_millis(200));

    slow.join().unwrap();

    let log = ledger.log.lock().unwrap();
    let fast_end = log.iter().position(|(room, phase)| room == "fast" && *phase == "end");
    let slow_end = log.iter().position(|(room, phase)| room == "slow" && *phase == "end");
    assert!(fast_end < slow_end);
}

#[test]
fn test_store_failure_releases_lock() {
    let ledger = Arc::new(FlakyLedger {
        inner: MemoryLedger::new(),
        failing: AtomicBool::new(true),
        attempts: AtomicUsize::new(0),
    });
    let clock = Arc::new(ManualClock::new(1000));
    let economy = Economy::new(catalog(), ledger.clone()).with_clock(clock.clone());

    assert!(matches!(
        economy.apply_increment("r", &BigInt::from(10), 1000),
        Err(EconomyError::Store(_))
    ));
    assert!(ledger.get_increment("r", 1000).unwrap().is_none());

    // Retry on the same room does not deadlock and succeeds once the store recovers.
    ledger.failing.store(false, Ordering::SeqCst);
    assert!(economy.apply_increment("r", &BigInt::from(10), 1000).unwrap().is_applied());
    assert_eq!(ledger.attempts.load(Ordering::SeqCst), 2);

    // A failed compaction leaves the ledger as it was.
    ledger.failing.store(true, Ordering::SeqCst);
    economy.apply_increment("r", &BigInt::from(5), 1000).ok();
    clock.set(1500);
    ledger.inner.set_increment("r", 1200, &BigInt::from(1)).unwrap();
    assert!(economy.get_status("r").is_err());
    assert_eq!(
        ledger.all_increments("r").unwrap(),
        vec![Adding::new(1000, 10), Adding::new(1200, 1)]
    );

    ledger.failing.store(false, Ordering::SeqCst);
    let status = economy.room_status("r").unwrap();
    assert_eq!(status.milli_currency(), Some(&BigInt::from(11_000)));
}

#[test]
fn test_room_time_is_monotonic() {
    let clock = Arc::new(ManualClock::new(1000));
    let economy = Economy::new(catalog(), Arc::new(MemoryLedger::new())).with_clock(clock.clone());

    let mut last = 0;
    for now in [1000, 1000, 1010, 2500, 2501] {
        clock.set(now);
        let status = economy.room_status("r").unwrap();
        assert!(status.room_time >= last);
        last = status.room_time;
    }

    clock.set(2000);
    assert!(economy.room_status("r").is_err());
    assert_eq!(economy.room_time("r"), 2501);
}

#[test]
fn test_concurrent_purchases_respect_ordinals() {
    let ledger = Arc::new(MemoryLedger::new());
    let clock = Arc::new(ManualClock::new(1000));
    let economy = Arc::new(Economy::new(catalog(), ledger.clone()).with_clock(clock));
    economy.apply_increment("r", &BigInt::from(1000), 1000).unwrap();

    // Every thread claims the room owns nothing; exactly one can win.
    let wins: usize = (0..8)
        .map(|_| {
            let economy = Arc::clone(&economy);
            thread::spawn(move || economy.apply_purchase("r", 1, 0, 1000).unwrap().is_applied())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| usize::from(h.join().unwrap()))
        .sum();

    assert_eq!(wins, 1);
    assert_eq!(ledger.count_purchases("r", 1).unwrap(), 1);
}
