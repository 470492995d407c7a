use oryx::prelude::*;
use quickcheck_macros::quickcheck;

#[test]
fn byte_constructor_is_big_endian_by_default_order() {
    let c = BvConst::from_bytes(&[0xaa, 0xbb, 0xcc, 0xdd], Endianness::Big);
    assert_eq!(c.as_u64(), 0xaabbccdd);

    let c = BvConst::from_bytes(&[0xaa, 0xbb, 0xcc, 0xdd], Endianness::Little);
    assert_eq!(c.as_u64(), 0xddccbbaa);
}

#[test]
fn wide_byte_constructor_round_trips_through_hex() {
    let bytes: Vec<u8> = (0u16..91).map(|i| (i * 7 % 251) as u8 | 1).collect();
    let c = BvConst::from_bytes(&bytes, Endianness::Big);
    assert_eq!(c.width(), 91 * 8);
    assert_eq!(c.as_bytes(Endianness::Big), bytes);
}

#[test]
fn add_sub_wrap_on_wide_values() {
    let a = BvConst::new(10, 256);
    let b = BvConst::new(1231, 256);

    assert_eq!(a.add(&b).to_string(), "1241");
    assert_eq!(b.sub(&a).to_string(), "1221");

    let zero = BvConst::new(0, 256);
    let minus_one = zero.sub(&BvConst::new(1, 256));
    assert!(minus_one.has_all_bits());
}

#[test]
fn shifts_match_width_semantics() {
    let c = BvConst::new(10, 32);
    assert_eq!(c.shl(1).as_u64(), 20);

    let c = BvConst::new(128, 8);
    assert_eq!(c.lshr(1).as_u64(), 64);
    assert_eq!(c.ashr(1).as_u64(), 192);

    // shifting everything out
    assert_eq!(BvConst::new(0xff, 8).shl(8).as_u64(), 0);
    assert_eq!(BvConst::new(0xff, 8).lshr(9).as_u64(), 0);
    assert_eq!(BvConst::new(0x80, 8).ashr(8).as_u64(), 0xff);
    assert_eq!(BvConst::new(0x7f, 8).ashr(100).as_u64(), 0);
}

#[test]
fn ashr_preserves_sign_on_wide_values() {
    let c = BvConst::from_str_literal("0xff000000000000000000000000000000", 128);
    assert_eq!(
        format!("{:x}", c.ashr(1)),
        "0xff800000000000000000000000000000"
    );
    assert_eq!(
        format!("{:x}", c.lshr(1)),
        "0x7f800000000000000000000000000000"
    );
}

#[test]
fn sext_fills_with_ones_for_negative_values() {
    let c = BvConst::new(128, 8).sext(32);
    assert_eq!(c.width(), 32);
    assert_eq!(c.to_string(), "4294967168");

    let c = BvConst::new(0xffffff00, 32).sext(128);
    assert_eq!(format!("{c:x}"), "0xffffffffffffffffffffffffffffff00");

    let all_ones = BvConst::new(0xff, 8).sext(256);
    assert!(all_ones.has_all_bits());
}

#[test]
fn zext_keeps_value() {
    for target in [32u32, 128, 256] {
        let c = BvConst::new(10, 8).zext(target);
        assert_eq!(c.width(), target);
        assert_eq!(c.to_string(), "10");
    }
}

#[test]
fn extract_takes_a_bit_window() {
    let c = BvConst::new(0xaabbccddeeff, 256);
    let low = c.extract(7, 0);
    assert_eq!(low.width(), 8);
    assert_eq!(low.as_u64(), 0xff);

    let mid = BvConst::new(0xaabb, 32).extract(11, 4);
    assert_eq!(mid.as_u64(), 0xab);
}

#[test]
fn concat_widens() {
    let c = BvConst::new(0xaa, 8).concat(&BvConst::new(0xbb, 8));
    assert_eq!(c.width(), 16);
    assert_eq!(c.as_u64(), 0xaabb);

    let wide = BvConst::new(1231, 256).concat(&BvConst::new(10, 256));
    assert_eq!(wide.width(), 512);
    assert_eq!(wide.extract(255, 0).as_u64(), 10);
    assert_eq!(wide.extract(511, 256).to_string(), "1231");
}

#[test]
fn signed_and_unsigned_comparisons_disagree_on_the_sign_bit() {
    let ff = BvConst::new(0xff, 8);
    let one = BvConst::new(0x01, 8);
    assert!(ff.ugt(&one));
    assert!(ff.slt(&one));
    assert!(!ff.eq_value(&one));

    let wide_ff = ff.sext(128);
    let wide_one = BvConst::new(1, 128);
    assert!(wide_ff.ugt(&wide_one));
    assert!(wide_ff.slt(&wide_one));

    let a = BvConst::new(0x10, 128);
    let b = BvConst::new(0x20, 128);
    assert!(a.ult(&b));
    assert!(a.slt(&b));
}

#[test]
fn division_by_zero_panics() {
    let res = std::panic::catch_unwind(|| {
        BvConst::new(1, 8).udiv(&BvConst::new(0, 8));
    });
    assert!(res.is_err());
}

#[quickcheck]
fn byte_round_trip_big(value: u64) -> bool {
    let c = BvConst::new(value, 64);
    BvConst::from_bytes(&c.as_bytes(Endianness::Big), Endianness::Big) == c
}

#[quickcheck]
fn byte_round_trip_little(value: u64) -> bool {
    let c = BvConst::new(value, 64);
    BvConst::from_bytes(&c.as_bytes(Endianness::Little), Endianness::Little) == c
}

#[quickcheck]
fn add_wraps_like_u32(a: u32, b: u32) -> bool {
    let sum = BvConst::new(a as u64, 32).add(&BvConst::new(b as u64, 32));
    sum.as_u64() == a.wrapping_add(b) as u64
}

#[quickcheck]
fn neg_is_two_complement(a: u32) -> bool {
    let neg = BvConst::new(a as u64, 32).neg();
    neg.as_u64() == a.wrapping_neg() as u64
}
