//! Property tests for ready-queue ordering, timer ordering, and parameter packing.

mod common;

use common::*;
use cosync::bfm::{pack, unpack, MarshalError, ParamType, ParamValue};
use cosync::trigger::Timer;
use cosync::types::SimTime;
use cosync::Scheduler;
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

proptest! {
    #![proptest_config(test_proptest_config(64))]

    #[test]
    fn ready_work_runs_in_schedule_order(
        batches in prop::collection::vec(0usize..4, 1..24)
    ) {
        init_test_logging();
        let sched = Scheduler::default();
        let order = Rc::new(RefCell::new(Vec::new()));

        // Item i appends `batches[i]` follow-ups when it runs.
        let mut expected: Vec<(usize, usize)> = (0..batches.len()).map(|i| (i, 0)).collect();
        for (i, &n) in batches.iter().enumerate() {
            expected.extend((1..=n).map(|k| (i, k)));
        }

        for (i, &n) in batches.iter().enumerate() {
            let order = Rc::clone(&order);
            sched.schedule(move |s| {
                order.borrow_mut().push((i, 0));
                for k in 1..=n {
                    let order = Rc::clone(&order);
                    s.schedule(move |_| {
                        order.borrow_mut().push((i, k));
                        Ok(())
                    });
                }
                Ok(())
            });
        }
        sched.run().unwrap();

        prop_assert_eq!(&*order.borrow(), &expected);
        prop_assert!(sched.is_idle());
    }

    #[test]
    fn timers_wake_in_deadline_then_spawn_order(
        delays in prop::collection::vec(1u64..50, 1..16)
    ) {
        let (sched, sim) = test_bench();
        let woke = Rc::new(RefCell::new(Vec::new()));
        for (i, &ticks) in delays.iter().enumerate() {
            let woke = Rc::clone(&woke);
            sched.spawn(format!("t{i}"), move |cx| async move {
                let at = cx.wait(&Timer::new(ticks)).await?;
                woke.borrow_mut().push((at, i));
                Ok(())
            });
        }
        sim.run_until_idle(&sched).unwrap();

        let mut expected: Vec<(SimTime, usize)> = delays
            .iter()
            .enumerate()
            .map(|(i, &t)| (SimTime::from_ticks(t), i))
            .collect();
        expected.sort();
        prop_assert_eq!(&*woke.borrow(), &expected);
    }

    #[test]
    fn signed_values_in_range_survive_packing(width in 1u8..=64, raw in any::<i64>()) {
        let kind = ParamType::Bits { width, signed: true }.kind().unwrap();
        let (lo, hi) = kind.range();
        let value = i128::from(raw).clamp(lo, hi);
        let value = i64::try_from(value).unwrap();

        let word = pack(ParamValue::from(value), kind).unwrap();
        prop_assert_eq!(word & !kind.mask(), 0);
        prop_assert_eq!(unpack(word, kind), ParamValue::Signed(value));
    }

    #[test]
    fn unsigned_values_above_range_are_rejected(width in 1u8..64, excess in 0u64..1024) {
        let kind = ParamType::Bits { width, signed: false }.kind().unwrap();
        let value = kind.mask().saturating_add(1).saturating_add(excess);
        prop_assume!(value > kind.mask());
        let err = pack(ParamValue::from(value), kind).unwrap_err();
        let is_out_of_range = matches!(err, MarshalError::OutOfRange { .. });
        prop_assert!(is_out_of_range);
    }
}
