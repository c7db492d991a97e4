use meshtable_types::{Bits, Mask};
use pretty_assertions::assert_eq;

// ── set_flags ────────────────────────────────────────────────────

#[test]
fn zero_has_no_flags() {
    let bits = Bits::zero();
    assert!(bits.is_zero());
    assert_eq!(bits.count(), 0);
    assert!(!bits.get(0));
}

#[test]
fn set_flags_sets_each_index() {
    let bits = Bits::zero().set_flags(&[1, 2, 3]);
    assert!(!bits.get(0));
    assert!(bits.get(1));
    assert!(bits.get(2));
    assert!(bits.get(3));
    assert_eq!(bits.count(), 3);
}

#[test]
fn setting_a_set_flag_is_a_noop() {
    let once = Bits::zero().set_flags(&[7]);
    let twice = once.clone().set_flags(&[7]);
    assert_eq!(once, twice);
}

#[test]
fn indices_span_limb_boundaries() {
    let bits = Bits::zero().set_flags(&[63, 64, 65]);
    assert!(bits.get(63));
    assert!(bits.get(64));
    assert!(bits.get(65));
    assert!(!bits.get(62));
    assert!(!bits.get(66));
}

#[test]
fn large_indices_are_supported() {
    let bits = Bits::zero().set_flags(&[100_001]);
    assert!(bits.get(100_001));
    assert!(!bits.get(100_000));
    assert_eq!(bits.count(), 1);
}

// ── masks ────────────────────────────────────────────────────────

#[test]
fn unset_round_trips_to_zero() {
    for i in [0, 1, 63, 64, 1_000, 1_000_000] {
        let bits = Bits::zero().set_flags(&[i]);
        assert_eq!(bits.apply_mask(&Mask::unset_flag(i)), Bits::zero(), "i={i}");
    }
}

#[test]
fn clearing_one_of_three_flags() {
    let bits = Bits::zero().set_flags(&[1, 2, 3]);
    let cleared = bits.apply_mask(&Mask::unset_flag(1));
    assert_eq!(cleared, Bits::zero().set_flags(&[2, 3]));
}

#[test]
fn mask_on_unset_flag_changes_nothing() {
    let bits = Bits::zero().set_flags(&[2, 3]);
    assert_eq!(bits.apply_mask(&Mask::unset_flag(10)), bits);
}

#[test]
fn mask_on_zero_is_zero() {
    assert_eq!(Bits::zero().apply_mask(&Mask::unset_flag(5)), Bits::zero());
}

#[test]
fn unset_all_clears_a_whole_set() {
    let bits = Bits::zero().set_flags(&[0, 9, 700]);
    let mask = Mask::unset_all(bits.clone());
    assert_eq!(bits.apply_mask(&mask), Bits::zero());
}

#[test]
fn equality_ignores_how_the_set_was_built() {
    // Clearing a high flag must not leave the value unequal to one that
    // never had it.
    let a = Bits::zero()
        .set_flags(&[1, 500])
        .apply_mask(&Mask::unset_flag(500));
    let b = Bits::zero().set_flags(&[1]);
    assert_eq!(a, b);
}
