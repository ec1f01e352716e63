//! Property-based tests for the dialogue engine

use super::*;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

type Trace = Arc<Mutex<Vec<usize>>>;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn traced(trace: &Trace, id: usize, next: Option<StepRef>) -> StepRef {
    let trace = Arc::clone(trace);
    Step::sequential(
        move |_, _| {
            trace.lock().unwrap().push(id);
            async { Ok(()) }
        },
        next,
    )
}

/// Chain of `len` sequential steps with ids `0..len`
fn chain(trace: &Trace, len: usize) -> StepRef {
    let mut next = None;
    for id in (0..len).rev() {
        next = Some(traced(trace, id, next));
    }
    next.unwrap()
}

proptest! {
    #[test]
    fn sequential_chain_visits_each_step_once_in_order(len in 1usize..12) {
        let rt = runtime();
        let trace: Trace = Arc::default();
        let mut session = Session::one_shot(chain(&trace, len));

        rt.block_on(async {
            for _ in 0..len {
                session.run(&Scope::background()).await.unwrap();
            }
        });

        prop_assert!(session.is_finished());
        prop_assert_eq!(trace.lock().unwrap().clone(), (0..len).collect::<Vec<_>>());
    }

    #[test]
    fn conditional_only_runs_the_chosen_branch(choice in any::<bool>()) {
        let rt = runtime();
        let trace: Trace = Arc::default();
        let on_true = traced(&trace, 1, None);
        let on_false = traced(&trace, 0, None);
        let branch = Step::conditional(
            move |_, _| async move { Ok(choice) },
            Some(on_true),
            Some(on_false),
        );
        let mut session = Session::one_shot(branch);

        rt.block_on(session.run(&Scope::background())).unwrap();

        prop_assert_eq!(trace.lock().unwrap().clone(), vec![usize::from(choice)]);
        prop_assert!(session.is_finished());
    }

    #[test]
    fn finished_session_never_invokes_actions(extra_runs in 1usize..5) {
        let rt = runtime();
        let trace: Trace = Arc::default();
        let mut session = Session::one_shot(chain(&trace, 1));

        rt.block_on(async {
            session.run(&Scope::background()).await.unwrap();
            for _ in 0..extra_runs {
                let err = session.run(&Scope::background()).await.unwrap_err();
                assert!(matches!(err, DialogError::NothingToDo));
            }
        });

        prop_assert_eq!(trace.lock().unwrap().len(), 1);
    }

    #[test]
    fn context_values_are_session_local(key in "[a-z]{1,8}", value in any::<i64>()) {
        let key: &'static str = Box::leak(key.into_boxed_str());
        let first = Session::one_shot(Step::action(|_, _| async { Ok(()) }));
        let second = Session::one_shot(Step::action(|_, _| async { Ok(()) }));

        first.add_value(ContextKey::Custom(key), value);

        prop_assert_eq!(first.value::<i64>(ContextKey::Custom(key)).unwrap(), value);
        prop_assert!(second.value::<i64>(ContextKey::Custom(key)).is_err());
    }
}
