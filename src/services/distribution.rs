use rand::seq::SliceRandom;
use rand::Rng;

use crate::services::errors::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pairing<S, V> {
    pub(crate) student: S,
    pub(crate) variant: V,
}

/// Shuffles `variants` once and deals them round-robin over `students` in the given
/// order, so `students[i]` receives `shuffled[i % variants.len()]`.
pub(crate) fn round_robin<S: Clone, V: Clone, R: Rng + ?Sized>(
    students: &[S],
    variants: &[V],
    rng: &mut R,
) -> Result<Vec<Pairing<S, V>>, DomainError> {
    if students.is_empty() {
        return Err(DomainError::EmptyGroup);
    }
    if variants.is_empty() {
        return Err(DomainError::Invalid("At least one variant is required".to_string()));
    }

    let mut shuffled = variants.to_vec();
    shuffled.shuffle(rng);

    Ok(students
        .iter()
        .enumerate()
        .map(|(index, student)| Pairing {
            student: student.clone(),
            variant: shuffled[index % shuffled.len()].clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn every_student_gets_one_variant_and_usage_is_balanced() {
        let mut rng = StdRng::seed_from_u64(17);
        for (students, variants) in [(1, 1), (5, 2), (7, 3), (3, 5), (20, 6), (12, 4)] {
            let student_ids: Vec<usize> = (0..students).collect();
            let variant_ids: Vec<char> = ('a'..).take(variants).collect();

            let pairs = round_robin(&student_ids, &variant_ids, &mut rng).expect("pairs");

            assert_eq!(pairs.len(), students);
            let assigned: Vec<usize> = pairs.iter().map(|pair| pair.student).collect();
            assert_eq!(assigned, student_ids);

            let mut usage: HashMap<char, usize> = HashMap::new();
            for pair in &pairs {
                *usage.entry(pair.variant).or_default() += 1;
            }
            let floor = students / variants;
            let ceil = students.div_ceil(variants);
            for variant in &variant_ids {
                let used = usage.get(variant).copied().unwrap_or(0);
                assert!(
                    used == floor || used == ceil,
                    "variant {variant} used {used} times for {students}/{variants}"
                );
            }
        }
    }

    #[test]
    fn first_round_uses_distinct_variants_and_then_repeats() {
        let mut rng = StdRng::seed_from_u64(99);
        let students: Vec<u32> = (0..7).collect();
        let variants = vec!["v1", "v2", "v3"];

        let pairs = round_robin(&students, &variants, &mut rng).expect("pairs");

        let first_round: HashSet<&str> = pairs[..3].iter().map(|pair| pair.variant).collect();
        assert_eq!(first_round.len(), 3);
        for index in 3..pairs.len() {
            assert_eq!(pairs[index].variant, pairs[index % 3].variant);
        }
    }

    #[test]
    fn empty_group_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let error =
            round_robin::<u32, &str, _>(&[], &["v1"], &mut rng).expect_err("empty group");
        assert_eq!(error, DomainError::EmptyGroup);
    }

    #[test]
    fn empty_variant_list_is_invalid() {
        let mut rng = StdRng::seed_from_u64(1);
        let error = round_robin::<u32, &str, _>(&[1, 2], &[], &mut rng).expect_err("no variants");
        assert!(matches!(error, DomainError::Invalid(_)));
    }
}
