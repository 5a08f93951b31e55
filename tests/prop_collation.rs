use hospital_registry::query::Collation;
use proptest::prelude::*;
use std::cmp::Ordering;

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    #[test]
    fn compare_is_antisymmetric(a in "[a-zA-Z0-9 ]{0,12}", b in "[a-zA-Z0-9 ]{0,12}") {
        let c = Collation::default();
        prop_assert_eq!(c.compare(&a, &b), c.compare(&b, &a).reverse());
        prop_assert_eq!(c.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn case_is_ignored(s in "[a-zA-Z0-9]{0,16}") {
        let c = Collation::default();
        prop_assert!(c.equals(&s, &s.to_ascii_uppercase()));
        prop_assert!(c.equals(&s.to_ascii_lowercase(), &s));
    }

    #[test]
    fn numbers_inside_strings_order_by_value(n in 0u32..100_000, m in 0u32..100_000) {
        let c = Collation::default();
        prop_assert_eq!(c.compare(&format!("item{n}"), &format!("ITEM{m}")), n.cmp(&m));
    }

    #[test]
    fn sorting_yields_a_consistent_order(mut items in prop::collection::vec("[a-cA-C0-9]{0,6}", 0..30)) {
        let c = Collation::default();
        items.sort_by(|a, b| c.compare(a, b));
        for pair in items.windows(2) {
            prop_assert_ne!(c.compare(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn simple_collation_is_byte_order(a in "[a-zA-Z0-9]{0,10}", b in "[a-zA-Z0-9]{0,10}") {
        prop_assert_eq!(Collation::simple().compare(&a, &b), a.cmp(&b));
    }
}
