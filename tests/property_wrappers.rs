use proptest::prelude::*;
use rust_vecenv::utils::split_n;
use rust_vecenv::{CounterEnv, Env, FrameStack, RandomWalkEnv, Seeds};

proptest! {
    // The stack always holds exactly k observations: the last k seen since
    // reset, left-padded with the reset observation.
    #[test]
    fn frame_stack_window_is_last_k(k in 1usize..8, actions in proptest::collection::vec(0i64..=1, 0..40)) {
        let mut env = FrameStack::new(CounterEnv::new(1_000), k).unwrap();
        let first = env.reset();
        prop_assert_eq!(first, vec![0; k]);

        let mut history = vec![0i64; k];
        let mut index = 0i64;
        for a in actions {
            index = if a == 1 { index + 1 } else { (index - 1).max(0) };
            history.push(index);
            let step = env.step(a).unwrap();
            prop_assert_eq!(env.inner().index(), index);
            prop_assert_eq!(step.observation.len(), k);
            prop_assert_eq!(&step.observation[..], &history[history.len() - k..]);
        }
    }

    // Derived seeds depend only on the root, and a longer split extends a shorter one.
    #[test]
    fn derived_seeds_are_stable_prefixes(root in any::<u64>(), n in 0usize..32, extra in 0usize..8) {
        let short = Seeds::Derived(root).resolve(n).unwrap();
        let long = Seeds::Derived(root).resolve(n + extra).unwrap();
        prop_assert_eq!(short.len(), n);
        prop_assert_eq!(&long[..n], &short[..]);
        prop_assert_eq!(short, split_n(root, n).into_iter().map(Some).collect::<Vec<_>>());
    }

    // Same seed, same trajectory; positions never leave the bound by more than one move.
    #[test]
    fn random_walk_is_reproducible(seed in any::<u64>(), bound in 1i64..10) {
        let mut a = RandomWalkEnv::new(bound);
        let mut b = RandomWalkEnv::new(bound);
        a.seed(Some(seed));
        b.seed(Some(seed));
        prop_assert_eq!(a.reset(), b.reset());
        for t in 0..200i64 {
            let action = t % 3 - 1;
            let (sa, sb) = (a.step(action).unwrap(), b.step(action).unwrap());
            prop_assert_eq!(&sa, &sb);
            prop_assert!(sa.observation.abs() <= bound + 2);
            if sa.done {
                prop_assert!(sa.observation.abs() >= bound);
                a.reset();
                b.reset();
            }
        }
    }
}
