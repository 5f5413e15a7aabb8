//! Property-based tests for core invariants
//!
//! - Amount parsing round-trips at two decimal places
//! - Amount equality respects the epsilon boundary exactly
//! - RRN well-formedness accepts 12 digits and nothing else

use proptest::prelude::*;
use recon_core::normalize::{parse_amount, parse_date_time, parse_dr_cr};
use recon_core::types::{amounts_match, rrn_is_well_formed, DrCr, ResponseCode};
use rust_decimal::Decimal;

fn cents_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_00i64
}

proptest! {
    #[test]
    fn amount_parse_round_trips_two_decimals(cents in cents_strategy()) {
        let amount = Decimal::new(cents, 2);
        let formatted = format!("{:.2}", amount);
        let parsed = parse_amount(&formatted).unwrap();
        prop_assert_eq!(parsed, amount);
    }

    #[test]
    fn amount_parse_strips_commas(cents in cents_strategy()) {
        let amount = Decimal::new(cents, 2);
        let plain = format!("{:.2}", amount);
        // Insert a thousands separator after the first digit
        let with_comma = format!("{},{}", &plain[..1], &plain[1..]);
        prop_assert_eq!(parse_amount(&with_comma).unwrap(), amount);
    }

    #[test]
    fn amounts_match_is_symmetric(a in cents_strategy(), b in cents_strategy()) {
        let epsilon = Decimal::new(1, 2);
        let a = Decimal::new(a, 2);
        let b = Decimal::new(b, 2);
        prop_assert_eq!(
            amounts_match(a, b, epsilon),
            amounts_match(b, a, epsilon)
        );
    }

    #[test]
    fn amounts_differing_by_a_cent_or_more_never_match(
        cents in cents_strategy(),
        delta in 1i64..10_000i64,
    ) {
        let epsilon = Decimal::new(1, 2);
        let a = Decimal::new(cents, 2);
        let b = Decimal::new(cents + delta, 2);
        prop_assert!(!amounts_match(a, b, epsilon));
    }

    #[test]
    fn twelve_digit_rrns_are_well_formed(rrn in "[0-9]{12}") {
        prop_assert!(rrn_is_well_formed(&rrn));
    }

    #[test]
    fn other_lengths_are_rejected(rrn in "[0-9]{1,11}|[0-9]{13,20}") {
        prop_assert!(!rrn_is_well_formed(&rrn));
    }

    #[test]
    fn dr_cr_parse_never_panics(raw in ".{0,12}") {
        let _ = parse_dr_cr(&raw);
    }

    #[test]
    fn decorated_debit_markers_parse(prefix in "[ /]{0,2}") {
        prop_assert_eq!(parse_dr_cr(&format!("{}DR", prefix)), DrCr::Debit);
        prop_assert_eq!(parse_dr_cr(&format!("{}cr", prefix)), DrCr::Credit);
    }

    #[test]
    fn response_code_round_trips(code in "[0-9A-Z]{2,3}") {
        let rc = ResponseCode::parse(&code);
        // Re-parsing the wire form is stable
        prop_assert_eq!(ResponseCode::parse(&rc.code()), rc);
    }

    #[test]
    fn iso_dates_parse(y in 2020i32..2030, m in 1u32..13, d in 1u32..29) {
        let raw = format!("{:04}-{:02}-{:02}", y, m, d);
        let (date, time) = parse_date_time(&raw).unwrap();
        prop_assert_eq!(date.to_string(), raw);
        prop_assert!(time.is_none());
    }
}
