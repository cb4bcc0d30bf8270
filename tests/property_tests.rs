#[cfg(test)]
mod property_tests {
    use std::collections::HashSet;

    use epidemic_dqn::env::{CellState, EpidemicConfig, EpidemicGridEnv, Environment};
    use epidemic_dqn::loss::{Loss, MeanSquaredError};
    use epidemic_dqn::replay_buffer::ReplayBuffer;
    use ndarray::{Array1, ArrayD, IxDyn};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn filled_buffer(capacity: usize, pushes: usize) -> ReplayBuffer {
        let mut buffer = ReplayBuffer::new(capacity).unwrap();
        for i in 0..pushes {
            let obs = ArrayD::from_elem(IxDyn(&[3]), i as f32);
            buffer.push(obs.view(), i % 4, i as f32, obs.view(), false);
        }
        buffer
    }

    // Strategy for paired prediction/target vectors of equal length
    fn paired_vectors() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
        (1usize..32).prop_flat_map(|n| {
            (
                prop::collection::vec(-100.0f32..100.0, n),
                prop::collection::vec(-100.0f32..100.0, n),
            )
        })
    }

    proptest! {
        #[test]
        fn test_buffer_keeps_most_recent_transitions(capacity in 1usize..64, pushes in 0usize..200) {
            let buffer = filled_buffer(capacity, pushes);
            prop_assert!(buffer.len() <= capacity);
            prop_assert_eq!(buffer.len(), pushes.min(capacity));

            let kept: Vec<usize> = buffer.iter().map(|t| t.reward as usize).collect();
            let expected: Vec<usize> = (pushes.saturating_sub(capacity)..pushes).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn test_sampling_draws_distinct_live_transitions(
            capacity in 1usize..64,
            pushes in 1usize..200,
            seed in any::<u64>(),
            fraction in 0.0f64..=1.0,
        ) {
            let buffer = filled_buffer(capacity, pushes);
            let batch_size = ((buffer.len() as f64 * fraction).ceil() as usize).max(1);
            let mut rng = StdRng::seed_from_u64(seed);

            let batch = buffer.sample_with_rng(batch_size, &mut rng).unwrap();
            prop_assert_eq!(batch.len(), batch_size);

            let ids: Vec<usize> = batch.rewards.iter().map(|&r| r as usize).collect();
            let unique: HashSet<usize> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), batch_size);

            let live: HashSet<usize> = buffer.iter().map(|t| t.reward as usize).collect();
            prop_assert!(unique.is_subset(&live));
        }

        #[test]
        fn test_oversized_sample_always_fails(capacity in 1usize..32, pushes in 0usize..64, extra in 1usize..8) {
            let buffer = filled_buffer(capacity, pushes);
            prop_assert!(buffer.sample(buffer.len() + extra).is_err());
        }

        #[test]
        fn test_mse_is_non_negative((predictions, targets) in paired_vectors()) {
            let predictions = Array1::from(predictions);
            let targets = Array1::from(targets);
            let loss = MeanSquaredError.compute(predictions.view(), targets.view()).unwrap();
            prop_assert!(loss >= 0.0);
            prop_assert!(loss.is_finite());

            let same = MeanSquaredError.compute(targets.view(), targets.view()).unwrap();
            prop_assert_eq!(same, 0.0);
        }

        #[test]
        fn test_epidemic_cells_are_conserved(seed in any::<u64>(), actions in prop::collection::vec(0usize..10, 1..12)) {
            let mut env = EpidemicGridEnv::new(EpidemicConfig { seed: Some(seed), ..EpidemicConfig::default() }).unwrap();
            env.reset().unwrap();
            let mut vaccinated = 0;
            for action in actions {
                let step = env.step(action).unwrap();
                let info = step.info;
                prop_assert_eq!(info.susceptible + info.infected + info.immune + info.vaccinated, 144);
                // Vaccination is permanent.
                prop_assert!(info.vaccinated >= vaccinated);
                vaccinated = info.vaccinated;
                prop_assert_eq!(step.done, env.count(CellState::Infected) == 0);
                if step.done {
                    break;
                }
            }
        }
    }
}
