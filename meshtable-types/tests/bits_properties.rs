use meshtable_types::{Bits, Mask};
use proptest::prelude::*;

proptest! {
    #[test]
    fn set_then_clear_everything_yields_zero(
        indices in prop::collection::vec(0usize..20_000, 0..64),
    ) {
        let bits = Bits::zero().set_flags(&indices);
        let mut cleared = bits;
        for &i in &indices {
            cleared = cleared.apply_mask(&Mask::unset_flag(i));
        }
        prop_assert!(cleared.is_zero());
    }

    #[test]
    fn set_flags_is_idempotent(
        indices in prop::collection::vec(0usize..20_000, 0..64),
    ) {
        let once = Bits::zero().set_flags(&indices);
        let twice = once.clone().set_flags(&indices);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn clearing_an_unrelated_flag_preserves_the_rest(
        indices in prop::collection::vec(0usize..1_000, 1..32),
        other in 1_001usize..2_000,
    ) {
        let bits = Bits::zero().set_flags(&indices);
        prop_assert_eq!(bits.apply_mask(&Mask::unset_flag(other)), bits);
    }
}
