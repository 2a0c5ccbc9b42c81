//! Coverage for `WideInt` scenarios that genuinely need more than 128
//! bits of precision, beyond the `Wide128`-vs-`i128` parity checks living
//! beside the type itself: carry propagation past a single limb
//! boundary, and cross-width fuzzing at 256 and 512 bits.

use satcat5::wide::{Wide128, Wide256, Wide512};

struct XorShift(u64);
impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_i32(&mut self) -> i32 {
        self.next() as i32
    }
}

#[test]
fn repeated_addition_of_i128_max_grows_monotonically_past_256_bits() {
    // Summing i128::MAX into itself enough times overflows a single
    // 128-bit limb several times over; a Wide512 accumulator should
    // just keep growing rather than wrapping back through zero.
    let mut acc = Wide512::from_i128(0);
    let step = Wide512::from_i128(i128::MAX);
    let mut prev = acc;
    for _ in 0..64 {
        acc = acc.wrapping_add(step);
        assert!(acc > prev, "accumulator should strictly increase, never wrap, across limb boundaries");
        prev = acc;
    }
}

#[test]
fn wide256_shift_round_trips_for_amounts_beyond_a_single_limb() {
    for &value in &[1i128, -1, i128::MAX, i128::MIN, 12345, -98765] {
        let w = Wide256::from_i128(value);
        for amount in [0u32, 1, 63, 64, 65, 127, 128, 129] {
            let shifted_out_and_back = (w << amount) >> amount;
            // A shift left by `amount` then right by the same amount
            // only round-trips the bits that didn't fall off the top;
            // for amounts a Wide256 can hold without losing value's own
            // sign-extended bits (i.e. when the shift stays within the
            // headroom 256 bits has over a 128-bit value) it must
            // reproduce the original value exactly.
            if amount < 128 {
                assert_eq!(shifted_out_and_back.to_i128(), value, "amount={amount}, value={value}");
            }
        }
    }
}

#[test]
fn wide256_arithmetic_right_shift_sign_extends_like_i128() {
    assert_eq!((Wide256::from_i128(-1) >> 64).to_i128(), -1);
    assert_eq!((Wide256::from_i128(i128::MIN) >> 1).to_i128(), i128::MIN >> 1);
}

#[test]
fn wide128_wide256_and_wide512_agree_on_small_fuzzed_arithmetic() {
    // With inputs kept to i32 range, a few thousand adds/subs can never
    // overflow even a 128-bit accumulator, so all three widths (and a
    // plain i128 oracle) must produce identical results.
    let mut rng = XorShift(0xC0FF_EE15_BEEF_0000);
    let mut oracle: i128 = 0;
    let mut w128 = Wide128::from_i128(0);
    let mut w256 = Wide256::from_i128(0);
    let mut w512 = Wide512::from_i128(0);

    for i in 0..2000 {
        let delta = rng.next_i32() as i128;
        if i % 7 == 0 {
            oracle -= delta;
            w128 = w128 - Wide128::from_i128(delta);
            w256 = w256 - Wide256::from_i128(delta);
            w512 = w512 - Wide512::from_i128(delta);
        } else {
            oracle += delta;
            w128 = w128 + Wide128::from_i128(delta);
            w256 = w256 + Wide256::from_i128(delta);
            w512 = w512 + Wide512::from_i128(delta);
        }
    }

    assert_eq!(w128.to_i128(), oracle);
    assert_eq!(w256.to_i128(), oracle);
    assert_eq!(w512.to_i128(), oracle);
}
