//! Kill delivery, cleanup, and trigger disarm.

mod common;

use common::*;
use cosync::record::TaskState;
use cosync::trigger::{Event, Timer};
use cosync::types::{Outcome, SimTime, TaskError};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn killed_task_runs_cleanup_that_awaits() {
    let (sched, sim) = test_bench();
    test_phase!("killed_task_runs_cleanup_that_awaits");
    let log = Rc::new(RefCell::new(Vec::new()));

    let victim_log = Rc::clone(&log);
    let victim = sched.spawn("victim", move |cx| async move {
        match cx.wait(&Timer::new(100)).await {
            Ok(_) => {
                victim_log.borrow_mut().push("timer fired".to_string());
                Ok(())
            }
            Err(TaskError::Killed) => {
                victim_log.borrow_mut().push("cleanup start".to_string());
                let at = cx.wait(&Timer::new(5)).await?;
                victim_log
                    .borrow_mut()
                    .push(format!("cleanup done at {}", at.ticks()));
                Err(TaskError::Killed)
            }
            Err(other) => Err(other),
        }
    });

    let target = victim.clone();
    sched.spawn("killer", move |cx| async move {
        cx.wait(&Timer::new(10)).await?;
        target.kill();
        Ok(())
    });

    sim.run_until_idle(&sched).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["cleanup start".to_string(), "cleanup done at 15".to_string()]
    );
    assert_outcome_killed!(victim.result().unwrap());
    assert_with_log!(
        sched.now() == SimTime::from_ticks(15),
        "the 100-tick timer was cancelled",
        SimTime::from_ticks(15),
        sched.now()
    );
    assert_eq!(sim.pending(), 0);
    assert_eq!(sched.live_tasks(), 0);
    test_complete!("killed_task_runs_cleanup_that_awaits");
}

#[test]
fn killing_a_created_task_never_runs_its_body() {
    let (sched, _sim) = test_bench();
    test_phase!("killing_a_created_task_never_runs_its_body");
    let ran = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ran);
    let task = sched.spawn("never", move |_cx| async move {
        flag.set(true);
        Ok(())
    });
    assert!(matches!(task.state(), TaskState::Created));

    task.kill();
    assert!(task.is_finished());
    assert_outcome_killed!(task.result().unwrap());

    sched.run().unwrap();
    assert!(!ran.get());
    assert_eq!(sched.live_tasks(), 0);
    test_complete!("killing_a_created_task_never_runs_its_body");
}

#[test]
fn killing_a_finished_task_is_a_noop() {
    let (sched, _sim) = test_bench();
    let task = sched.spawn("quick", |_cx| async move { Ok(1u8) });
    sched.run().unwrap();
    task.kill();
    task.kill();
    sched.run().unwrap();
    assert_outcome_value!(task.result().unwrap(), 1);
}

#[test]
fn repeated_kill_is_delivered_once() {
    let (sched, sim) = test_bench();
    let kills = Rc::new(Cell::new(0u32));
    let count = Rc::clone(&kills);
    let task = sched.spawn("stubborn", move |cx| async move {
        if let Err(TaskError::Killed) = cx.wait(&Timer::new(50)).await {
            count.set(count.get() + 1);
        }
        // A second wait after the kill was observed completes normally.
        cx.wait(&Timer::new(2)).await?;
        Ok(cx.now())
    });
    sched.run().unwrap();
    task.kill();
    task.kill();
    sim.run_until_idle(&sched).unwrap();

    assert_eq!(kills.get(), 1);
    assert_outcome_value!(task.result().unwrap(), SimTime::from_ticks(2));
}

#[test]
fn last_awaiter_leaving_disarms_the_trigger() {
    let (sched, sim) = test_bench();
    test_phase!("last_awaiter_leaving_disarms_the_trigger");
    let timer = Rc::new(Timer::new(30));

    let spawn_waiter = |name: &'static str| {
        let timer = Rc::clone(&timer);
        sched.spawn(name, move |cx| async move {
            cx.wait(&*timer).await?;
            Ok(())
        })
    };
    let first = spawn_waiter("first");
    let second = spawn_waiter("second");
    sched.run().unwrap();
    assert_eq!(sched.armed_callbacks(), 1);

    test_section!("kill one of two awaiters");
    first.kill();
    sched.run().unwrap();
    assert_eq!(sched.armed_callbacks(), 1);
    assert!(matches!(second.state(), TaskState::Suspended));

    test_section!("kill the last awaiter");
    second.kill();
    sched.run().unwrap();
    assert_eq!(sched.armed_callbacks(), 0);
    assert_eq!(sim.pending(), 0);
    assert_outcome_killed!(first.result().unwrap());
    assert_outcome_killed!(second.result().unwrap());
    test_complete!("last_awaiter_leaving_disarms_the_trigger");
}

#[test]
fn surviving_awaiter_still_receives_the_fire() {
    let (sched, sim) = test_bench();
    let go: Event<&'static str> = Event::new("go");

    let spawn_waiter = |name: &'static str| {
        let go = go.clone();
        sched.spawn(name, move |cx| async move { cx.wait(&go).await })
    };
    let doomed = spawn_waiter("doomed");
    let survivor = spawn_waiter("survivor");
    sched.run().unwrap();

    doomed.kill();
    let setter = go.clone();
    sched.spawn("setter", move |cx| async move {
        cx.wait(&Timer::new(1)).await?;
        setter.set("now");
        Ok(())
    });
    sim.run_until_idle(&sched).unwrap();

    assert_outcome_killed!(doomed.result().unwrap());
    assert_outcome_value!(survivor.result().unwrap(), "now");
}

#[test]
fn killing_a_parent_leaves_the_child_running() {
    let (sched, sim) = test_bench();
    let parent = sched.spawn("parent", |cx| async move {
        let child = cx.spawn("child", |cx| async move {
            cx.wait(&Timer::new(8)).await?;
            Ok(cx.now())
        })?;
        let result = cx.wait(&child.join()).await;
        result.map(|_| child.id())
    });
    sched.run().unwrap();
    let child = parent.children()[0];

    parent.kill();
    sim.run_until_idle(&sched).unwrap();

    assert_outcome_killed!(parent.result().unwrap());
    assert!(sched.task_state(child).is_none());
    assert_eq!(sched.now(), SimTime::from_ticks(8));
    assert!(matches!(parent.state(), TaskState::Finished(Outcome::Error(_))));
}

#[test]
fn checkpoint_observes_a_pending_kill() {
    let (sched, _sim) = test_bench();
    let gate: Event = Event::new("gate");
    let observed = Rc::new(Cell::new(false));

    let seen = Rc::clone(&observed);
    let waiter_gate = gate.clone();
    let task = sched.spawn("busy", move |cx| async move {
        let own = cx.task_id();
        let sched = cx.scheduler()?;
        waiter_gate.set(());
        sched.kill(own);
        seen.set(cx.is_killed());
        cx.checkpoint()?;
        Ok(())
    });
    sched.run().unwrap();

    assert!(observed.get());
    assert!(gate.is_set());
    assert_outcome_killed!(task.result().unwrap());
}
