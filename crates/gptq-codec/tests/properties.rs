//! Property-based tests for the codec laws.
//!
//! - pack/unpack round trip for in-range codes
//! - permute/sort keeps group membership and restores a monotone index
//! - quantization error bound and scale non-negativity

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use gptq_codec::{
    contiguous_group_index, gptq_pack, gptq_unpack, pack_factor, permute_rows, quantize_weights, sort_weights,
    Matrix,
};

fn arb_codes() -> impl Strategy<Value = (u32, Matrix<u32>)> {
    (prop_oneof![Just(4u32), Just(8u32)], 1usize..6, 1usize..9).prop_flat_map(|(num_bits, blocks, size_n)| {
        let size_k = blocks * (32 / num_bits) as usize;
        let max = (1u32 << num_bits) - 1;
        prop::collection::vec(0..=max, size_k * size_n).prop_map(move |data| {
            let codes = Matrix::from_vec(size_k, size_n, data).expect("sized by construction");
            (num_bits, codes)
        })
    })
}

fn arb_weights() -> impl Strategy<Value = Matrix<f32>> {
    (1usize..5, 1usize..6).prop_flat_map(|(groups, size_n)| {
        let size_k = groups * 32;
        prop::collection::vec(-4.0f32..4.0, size_k * size_n)
            .prop_map(move |data| Matrix::from_vec(size_k, size_n, data).expect("sized by construction"))
    })
}

proptest! {
    #[test]
    fn prop_pack_unpack_round_trip((num_bits, codes) in arb_codes()) {
        let (size_k, size_n) = codes.shape();
        let packed = gptq_pack(&codes, num_bits, size_k, size_n).unwrap();
        prop_assert_eq!(packed.rows(), size_k / pack_factor(num_bits).unwrap());
        let unpacked = gptq_unpack(&packed, num_bits, size_k, size_n).unwrap();
        prop_assert_eq!(unpacked, codes);
    }

    #[test]
    fn prop_permute_sort_keeps_groups(groups in 1usize..6, seed in any::<u64>()) {
        let size_k = groups * 32;
        let codes = Matrix::from_fn(size_k, 2, |r, _| r as u32);
        let reference = codes.map(|c| c as f32);
        let mut rng = StdRng::seed_from_u64(seed);

        let permuted = permute_rows(&codes, &reference, 32, &mut rng).unwrap();
        let sorted = sort_weights(&permuted.codes, &permuted.group_index).unwrap();

        prop_assert_eq!(&sorted.group_index, &contiguous_group_index(size_k, 32));
        for (i, &g) in sorted.group_index.iter().enumerate() {
            prop_assert_eq!(sorted.codes.get(i, 0) / 32, g);
        }
    }

    #[test]
    fn prop_quantization_bound(
        w in arb_weights(),
        num_bits in prop_oneof![Just(4u32), Just(8u32)],
        act_order in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let (size_k, size_n) = w.shape();
        let act_order = act_order && size_k > 32;
        let mut rng = StdRng::seed_from_u64(seed);
        let q = quantize_weights(&w.clone().into(), num_bits, 32, act_order, &mut rng).unwrap();

        let max = (1u32 << num_bits) - 1;
        prop_assert!(q.codes.as_slice().iter().all(|&c| c <= max));
        prop_assert!(q.scales.as_slice().iter().all(|&s| s >= 0.0));

        for i in 0..size_k {
            let original_row = if act_order { q.permutation[i] as usize } else { i };
            for n in 0..size_n {
                let scale = q.scales.get(original_row / 32, n);
                let err = (q.reference.get(i, n) - w.get(original_row, n)).abs();
                prop_assert!(err <= scale / 2.0 + 1e-5, "err {} scale {}", err, scale);
            }
        }
    }
}
