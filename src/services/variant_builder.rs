//! Splits a task pool into fixed-size variants.
//!
//! Two strategies exist and are kept apart on purpose: variant creation from the task
//! catalog uses [`Strategy::SliceOrShuffle`], control work generation uses
//! [`Strategy::CyclicReuse`]. For the same pool they produce different variants.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::services::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Contiguous slices when the pool covers every variant, otherwise an independent
    /// shuffle of the whole pool per variant.
    SliceOrShuffle,
    /// One shuffle of the pool, then task `order` of variant `n` is
    /// `pool[((n - 1) * per_variant + (order - 1)) % pool.len()]`.
    CyclicReuse,
}

impl Strategy {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Strategy::SliceOrShuffle => "slice_or_shuffle",
            Strategy::CyclicReuse => "cyclic_reuse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VariantPlan {
    pub(crate) tasks_per_variant: usize,
    pub(crate) variant_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DraftVariant<T> {
    pub(crate) name: String,
    pub(crate) tasks: Vec<T>,
}

pub(crate) fn variant_name(base: &str, number: usize) -> String {
    format!("{} - {}", base.trim(), number)
}

/// Checks that a pool of `pool_len` tasks can feed `plan`.
pub(crate) fn check_plan(pool_len: usize, plan: VariantPlan) -> Result<(), DomainError> {
    if plan.tasks_per_variant == 0 {
        return Err(DomainError::Invalid("tasks_per_variant must be at least 1".to_string()));
    }
    if plan.variant_count == 0 {
        return Err(DomainError::Invalid("variant_count must be at least 1".to_string()));
    }
    if pool_len < plan.tasks_per_variant {
        return Err(DomainError::InsufficientPool {
            pool: pool_len,
            required: plan.tasks_per_variant,
        });
    }
    Ok(())
}

pub(crate) fn build_variants<T: Clone, R: Rng + ?Sized>(
    strategy: Strategy,
    pool: &[T],
    plan: VariantPlan,
    base_name: &str,
    rng: &mut R,
) -> Result<Vec<DraftVariant<T>>, DomainError> {
    check_plan(pool.len(), plan)?;

    let task_lists = match strategy {
        Strategy::SliceOrShuffle => slice_or_shuffle(pool, plan, rng),
        Strategy::CyclicReuse => cyclic_reuse(pool, plan, rng),
    };

    Ok(task_lists
        .into_iter()
        .enumerate()
        .map(|(index, tasks)| DraftVariant { name: variant_name(base_name, index + 1), tasks })
        .collect())
}

fn slice_or_shuffle<T: Clone, R: Rng + ?Sized>(
    pool: &[T],
    plan: VariantPlan,
    rng: &mut R,
) -> Vec<Vec<T>> {
    let per_variant = plan.tasks_per_variant;

    if pool.len() >= per_variant * plan.variant_count {
        return pool
            .chunks(per_variant)
            .take(plan.variant_count)
            .map(|chunk| chunk.to_vec())
            .collect();
    }

    (0..plan.variant_count)
        .map(|_| {
            let mut shuffled = pool.to_vec();
            shuffled.shuffle(rng);
            shuffled.truncate(per_variant);
            shuffled
        })
        .collect()
}

fn cyclic_reuse<T: Clone, R: Rng + ?Sized>(
    pool: &[T],
    plan: VariantPlan,
    rng: &mut R,
) -> Vec<Vec<T>> {
    let mut shuffled = pool.to_vec();
    shuffled.shuffle(rng);

    let per_variant = plan.tasks_per_variant;
    (1..=plan.variant_count)
        .map(|variant_number| {
            (1..=per_variant)
                .map(|order| {
                    let index = ((variant_number - 1) * per_variant + (order - 1)) % shuffled.len();
                    shuffled[index].clone()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn pool(size: usize) -> Vec<u32> {
        (0..size as u32).collect()
    }

    fn plan(tasks_per_variant: usize, variant_count: usize) -> VariantPlan {
        VariantPlan { tasks_per_variant, variant_count }
    }

    #[test]
    fn six_tasks_split_into_two_ordered_halves() {
        let tasks = vec!["t1", "t2", "t3", "t4", "t5", "t6"];
        let mut rng = StdRng::seed_from_u64(1);

        let variants =
            build_variants(Strategy::SliceOrShuffle, &tasks, plan(3, 2), "Algebra", &mut rng)
                .expect("variants");

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].name, "Algebra - 1");
        assert_eq!(variants[0].tasks, vec!["t1", "t2", "t3"]);
        assert_eq!(variants[1].name, "Algebra - 2");
        assert_eq!(variants[1].tasks, vec!["t4", "t5", "t6"]);
    }

    #[test]
    fn large_pools_are_sliced_disjointly_in_order() {
        let mut rng = StdRng::seed_from_u64(7);
        for (size, per_variant, count) in [(10, 3, 3), (12, 4, 3), (20, 1, 20), (50, 7, 5)] {
            let tasks = pool(size);
            let variants =
                build_variants(Strategy::SliceOrShuffle, &tasks, plan(per_variant, count), "V", &mut rng)
                    .expect("variants");

            assert_eq!(variants.len(), count);
            let flattened: Vec<u32> =
                variants.iter().flat_map(|variant| variant.tasks.clone()).collect();
            assert_eq!(flattened, tasks[..per_variant * count].to_vec());

            let unique: HashSet<u32> = flattened.iter().copied().collect();
            assert_eq!(unique.len(), flattened.len(), "variants overlap for size {size}");
        }
    }

    #[test]
    fn small_pools_shuffle_without_duplicates_inside_a_variant() {
        let mut rng = StdRng::seed_from_u64(42);
        for (size, per_variant, count) in [(5, 3, 2), (4, 4, 3), (9, 5, 4), (3, 1, 10)] {
            let tasks = pool(size);
            let variants =
                build_variants(Strategy::SliceOrShuffle, &tasks, plan(per_variant, count), "V", &mut rng)
                    .expect("variants");

            assert_eq!(variants.len(), count);
            for variant in &variants {
                assert_eq!(variant.tasks.len(), per_variant);
                let unique: HashSet<u32> = variant.tasks.iter().copied().collect();
                assert_eq!(unique.len(), per_variant, "duplicate task in {variant:?}");
                assert!(variant.tasks.iter().all(|task| (*task as usize) < size));
            }
        }
    }

    #[test]
    fn pool_smaller_than_one_variant_is_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        for count in [1, 2, 20] {
            for strategy in [Strategy::SliceOrShuffle, Strategy::CyclicReuse] {
                let error = build_variants(strategy, &pool(2), plan(3, count), "V", &mut rng)
                    .expect_err("pool too small");
                assert_eq!(error, DomainError::InsufficientPool { pool: 2, required: 3 });
            }
        }
    }

    #[test]
    fn zero_sized_plans_are_invalid() {
        assert!(matches!(check_plan(5, plan(0, 1)), Err(DomainError::Invalid(_))));
        assert!(matches!(check_plan(5, plan(1, 0)), Err(DomainError::Invalid(_))));
    }

    #[test]
    fn cyclic_reuse_walks_one_shuffle_modulo_pool_size() {
        let tasks = pool(4);
        let mut expected = tasks.clone();
        expected.shuffle(&mut StdRng::seed_from_u64(11));

        let mut rng = StdRng::seed_from_u64(11);
        let variants =
            build_variants(Strategy::CyclicReuse, &tasks, plan(3, 3), "Control", &mut rng)
                .expect("variants");

        let picked: Vec<Vec<u32>> = variants.iter().map(|variant| variant.tasks.clone()).collect();
        assert_eq!(
            picked,
            vec![
                vec![expected[0], expected[1], expected[2]],
                vec![expected[3], expected[0], expected[1]],
                vec![expected[2], expected[3], expected[0]],
            ]
        );
        assert_eq!(variants[2].name, "Control - 3");
    }

    #[test]
    fn cyclic_reuse_never_repeats_inside_a_variant() {
        let mut rng = StdRng::seed_from_u64(5);
        let variants = build_variants(Strategy::CyclicReuse, &pool(7), plan(7, 6), "C", &mut rng)
            .expect("variants");

        for variant in variants {
            let unique: HashSet<u32> = variant.tasks.iter().copied().collect();
            assert_eq!(unique.len(), 7);
        }
    }

    #[test]
    fn strategies_follow_their_own_rules_on_the_same_input() {
        let tasks = pool(6);
        let sliced = build_variants(
            Strategy::SliceOrShuffle,
            &tasks,
            plan(3, 2),
            "V",
            &mut StdRng::seed_from_u64(9),
        )
        .expect("sliced");
        let cyclic =
            build_variants(Strategy::CyclicReuse, &tasks, plan(3, 2), "V", &mut StdRng::seed_from_u64(9))
                .expect("cyclic");

        let mut shuffled = tasks.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(9));

        assert_eq!(sliced[0].tasks, vec![0, 1, 2]);
        assert_eq!(cyclic[0].tasks, shuffled[..3].to_vec());
    }

    #[test]
    fn names_are_trimmed_and_numbered_from_one() {
        assert_eq!(variant_name("  Geometry ", 1), "Geometry - 1");
        assert_eq!(variant_name("Geometry", 12), "Geometry - 12");
    }
}
