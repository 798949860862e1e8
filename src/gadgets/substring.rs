//! Locating a constant needle in a byte buffer.

use bellpepper_core::{boolean::Boolean, ConstraintSystem, SynthesisError};
use ff::PrimeField;

use super::bytes::{index_bits, select_window, Byte, Position};

/// Result of [`find`].
pub struct SubstringMatch<F: PrimeField> {
    /// Whether `needle` occurs at `position`. Callers enforce it.
    pub found: Boolean,
    pub position: Position<F>,
    /// `haystack[position..position + needle.len() + lookahead]`, zero past the end.
    pub window: Vec<Byte<F>>,
}

/// First index at which `needle` occurs in `haystack`.
pub fn first_occurrence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Finds `needle` in `haystack`.
///
/// The position is a hint taken from the first occurrence, the circuit only proves that the
/// bytes at the hinted position equal the needle. The returned window also carries
/// `lookahead` bytes after the needle so callers can inspect what follows it.
pub fn find<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    haystack: &[Byte<F>],
    needle: &[u8],
    lookahead: usize,
) -> Result<SubstringMatch<F>, SynthesisError> {
    let values: Option<Vec<u8>> = haystack.iter().map(Byte::get_value).collect();
    let hint = values.map(|v| first_occurrence(&v, needle).unwrap_or(0));

    let position = Position::alloc(
        cs.namespace(|| "position"),
        hint,
        index_bits(haystack.len()),
    )?;
    let window = select_window(
        cs.namespace(|| "window"),
        haystack,
        &position,
        needle.len() + lookahead,
    )?;

    let mut found = Boolean::constant(true);
    for (i, (byte, expected)) in window.iter().zip(needle).enumerate() {
        let eq = byte.is_equal_constant(cs.namespace(|| format!("needle {i}")), *expected)?;
        found = Boolean::and(cs.namespace(|| format!("found {i}")), &found, &eq)?;
    }

    Ok(SubstringMatch {
        found,
        position,
        window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scalar;
    use bellpepper_core::test_cs::TestConstraintSystem;

    fn run(haystack: &[u8], needle: &[u8]) -> (Option<bool>, Option<usize>, Vec<u8>, bool) {
        let mut cs = TestConstraintSystem::<Scalar>::new();
        let bytes: Vec<_> = haystack
            .iter()
            .enumerate()
            .map(|(i, b)| {
                Byte::alloc_with_bits(cs.namespace(|| format!("h{i}")), Some(*b))
                    .unwrap()
                    .0
            })
            .collect();
        let m = find(cs.namespace(|| "find"), &bytes, needle, 2).unwrap();
        let window = m.window.iter().map(|b| b.get_value().unwrap()).collect();
        (
            m.found.get_value(),
            m.position.get_value(),
            window,
            cs.is_satisfied(),
        )
    }

    #[test]
    fn finds_first_occurrence() {
        let (found, pos, window, sat) =
            run(br#"{"sub":"1","email":"a","email":"b"}"#, b"\"email\"");
        assert_eq!(found, Some(true));
        assert_eq!(pos, Some(11));
        assert_eq!(window, b"\"email\":\"".to_vec());
        assert!(sat);
    }

    #[test]
    fn missing_needle_is_reported_not_found() {
        let (found, _, _, sat) = run(br#"{"sub":"1"}"#, b"\"email\"");
        assert_eq!(found, Some(false));
        assert!(sat);
    }

    #[test]
    fn needle_at_the_end_reads_zero_lookahead() {
        let (found, pos, window, _) = run(b"xxab", b"ab");
        assert_eq!(found, Some(true));
        assert_eq!(pos, Some(2));
        assert_eq!(window, b"ab\0\0".to_vec());
    }
}
