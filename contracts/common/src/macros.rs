/// Assert that two amounts differ by at most `epsilon` base units
#[macro_export]
macro_rules! assert_fuzzy_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let actual = $actual as u128;
        let expected = $expected as u128;
        let epsilon = $epsilon as u128;
        assert!(
            $crate::math::fuzzy_eq(actual, expected, epsilon),
            "{} != {} (diff {}, epsilon {})",
            actual,
            expected,
            actual.abs_diff(expected),
            epsilon
        );
    }};
}
